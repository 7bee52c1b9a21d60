//! Forum post extraction: raw page payload to persisted JSON plus images.

mod fields;
mod model;
mod naming;
mod post;

pub use fields::{collect_script, RawBlock, RawPost, RawReply, RawSegment, RawTag};
pub use model::{ContentBlock, ContentSection, ForumPost, PostHeading, PostVariant, Reply, Tag};
pub use naming::PostNamer;
pub use post::{
    assemble_post, DownloadingImageStore, ExtractError, ExtractResult, ImageRole, ImageStore,
    PostExtractor, PostSummary,
};
