mod automation;
mod error;
mod page;
mod retry;
mod session;
mod wait;

pub use automation::{BrowserLauncher, BrowserSession};
pub use error::{BrowserError, BrowserResult};
pub use page::{close_on_error, evaluate_as, ChromiumPage, PageSession, PageSessionFactory};
pub use retry::{RetryExhausted, RetryOutcome, RetryPolicy};
pub use session::{ManagedSession, SessionLauncher, SessionManager, SessionPhase};
pub use wait::{settle, wait_until};
