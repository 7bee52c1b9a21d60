mod common;

use serde_json::{json, Value};
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{fast_config, Event, ScriptedPage, ANYWHERE};
use harvest_core::storage::read_json;
use harvest_core::{ForumPost, ForumReport, ForumTraversal, HarvestContext};

async fn serve(server: &MockServer, route: &str, status: u16, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn topics_expand_listing_and_extract_questions() {
    let server = MockServer::start().await;
    serve(&server, "/img/schematic.png", 200, b"png-bytes").await;
    serve(&server, "/img/missing.png", 500, b"").await;

    let dir = tempdir().unwrap();
    let ctx = HarvestContext::new(fast_config(dir.path(), &server.uri())).unwrap();
    let forum = &ctx.config.forum;
    let q1 = format!("{}/s/question/0D5Q1/ldo-oscillates", server.uri());
    let other = format!("{}/s/feed/0D5F9", server.uri());
    let dead = format!("{}/s/question/0D5DEAD", server.uri());

    let page = ScriptedPage::new();
    page.attached_for(&forum.load_more_selector, 3)
        .count_at(ANYWHERE, &forum.selectors.title, 1)
        .links_at(
            ANYWHERE,
            &forum.topic_link_selector,
            &[q1.as_str(), other.as_str(), q1.as_str(), dead.as_str()],
        )
        .payload_at(
            &q1,
            json!({
                "title": "LDO oscillates",
                "date": "March 3, 2024",
                "body": {"segments": [
                    {"kind": "text", "value": "See the schematic"},
                    {"kind": "image", "value": "/img/schematic.png"},
                ]},
                "best_answer": {"segments": [{"kind": "text", "value": "Increase Cout."}]},
                "answer_count": "1 Answer",
                "answers": [{"segments": [{"kind": "text", "value": "Increase Cout."}]}],
                "replies": [{"username": "fae", "text": "Plot attached", "images": ["/img/missing.png"]}],
                "tags": [{"name": "LDO", "link": "https://community.onsemi.com/s/topic/ldo"}],
            }),
        )
        .payload_at(&other, json!({"title": "Feed item"}));

    let mut report = ForumReport::default();
    ForumTraversal::new(&ctx)
        .run_topics(&page, &mut report)
        .await
        .unwrap();

    assert_eq!(report.load_more_clicks, 3);
    assert_eq!(page.clicks_on(&forum.load_more_selector), vec![0, 0, 0]);
    assert_eq!(report.topics_extracted, 2);
    assert_eq!(report.failed_posts.len(), 1);
    assert_eq!(report.failed_posts[0].link, dead);
    assert_eq!(report.images_written, 1);
    assert_eq!(report.images_abandoned, 1);

    let post_dir = dir.path().join("forums/0D5Q1");
    let post: ForumPost = read_json(&post_dir.join("0D5Q1.json")).await.unwrap();
    let value = serde_json::to_value(&post).unwrap();
    assert_eq!(value["Question"], "LDO oscillates");
    assert_eq!(
        value["Details"]["content"],
        json!([
            {"type": "text", "content": "See the schematic"},
            {"type": "image", "content": "0D5Q1_detail_1.png"},
        ])
    );
    assert_eq!(value["All Answers"]["count"], 1);
    assert_eq!(
        value["Replies"],
        json!([{"username": "fae", "content": [{"type": "text", "content": "Plot attached"}]}])
    );
    assert_eq!(std::fs::read(post_dir.join("0D5Q1_detail_1.png")).unwrap(), b"png-bytes");

    let fallback: Value = read_json(&dir.path().join("forums/Topic_1/Topic_1.json")).await.unwrap();
    assert_eq!(fallback["Question"], "Feed item");
    assert_eq!(fallback["Link"], other.as_str());
}

#[tokio::test]
async fn load_more_stops_at_ceiling() {
    let dir = tempdir().unwrap();
    let mut config = fast_config(dir.path(), "http://127.0.0.1:9");
    config.forum.max_load_more = 2;
    let ctx = HarvestContext::new(config).unwrap();
    let page = ScriptedPage::new();
    page.attached_for(&ctx.config.forum.load_more_selector, 10);

    let mut report = ForumReport::default();
    ForumTraversal::new(&ctx)
        .run_topics(&page, &mut report)
        .await
        .unwrap();

    assert_eq!(report.load_more_clicks, 2);
    assert_eq!(report.topics_extracted, 0);
}

#[tokio::test]
async fn categories_skip_missing_tiles_and_close_every_page() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let mut config = fast_config(dir.path(), &server.uri());
    config.forum.categories = vec!["Sensors".to_string(), "Packaging".to_string()];
    let ctx = HarvestContext::new(config).unwrap();
    let forum = &ctx.config.forum;

    let sensors_tile = forum.tile_selector("Sensors");
    let article_one = forum.article_url("kA1");
    let article_two = forum.article_url("kA2");
    let pages = ScriptedPage::new();
    pages
        .count_at(ANYWHERE, &sensors_tile, 1)
        .navigates(&sensors_tile, "sensors-listing")
        .attributes_at("sensors-listing", &forum.article_list_selector, &["kA1", "kA2", "kA1"])
        .count_at(ANYWHERE, &forum.selectors.title, 1)
        .payload_at(
            &article_one,
            json!({
                "title": "Hall sensor placement",
                "body": {"text": "Keep it close.", "html": "<p>Keep it close.</p>", "images": []},
            }),
        )
        .payload_at(&article_two, json!({"title": "Ambient light sensing"}));

    let mut report = ForumReport::default();
    ForumTraversal::new(&ctx)
        .run_categories(&pages, &mut report)
        .await;

    assert_eq!(report.categories_visited, 1);
    assert_eq!(report.categories_skipped.len(), 1);
    assert_eq!(report.categories_skipped[0].category, "Packaging");
    assert!(report.categories_skipped[0].error.contains("timeout waiting for category tile"));
    assert_eq!(report.articles_extracted, 2);
    assert_eq!(pages.opened(), 2);
    let closes = pages.events().iter().filter(|e| **e == Event::Close).count();
    assert_eq!(closes, 2);

    let gotos = pages.gotos();
    assert_eq!(gotos.iter().filter(|url| **url == article_one).count(), 1);

    let article: Value = read_json(&dir.path().join("forums/kA1/kA1.json")).await.unwrap();
    assert_eq!(article["Title"], "Hall sensor placement");
    assert_eq!(
        article["Best Answer"]["content"],
        json!([
            {"type": "text", "content": "Keep it close."},
            {"type": "html", "content": "<p>Keep it close.</p>"},
        ])
    );
    assert!(article.get("Details").is_none());
}
