//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a small forum and run whole harvests
//! against it, from login to the rows in a temporary SQLite store.

use chrono::{TimeZone, Utc};
use opinion_harvest::config::{parse_config, Config, Credentials};
use opinion_harvest::crawler::AbortSignal;
use opinion_harvest::harvest::Harvester;
use opinion_harvest::pipeline::LanguageDetector;
use opinion_harvest::storage::{ReviewStore, RunStatus, SqliteStorage};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Treats every review as Polish
struct AlwaysPolish;

impl LanguageDetector for AlwaysPolish {
    fn detect(&self, _text: &str) -> Option<String> {
        Some("pl".to_string())
    }
}

const LOGIN_PAGE: &str = r#"
    <html><body>
      <form action="login.php" method="post">
        <input type="hidden" name="sid" value="s1">
        <input type="text" name="username">
        <input type="password" name="password">
      </form>
    </body></html>"#;

const OPINIONS_PAGE: &str = r#"
    <html><body>
      <a href="/f,matematycy,6">Matematycy</a>
      <a href="/f,fizycy,7">Fizycy</a>
      <a href="/f,bez-numeru,abc">Zepsuty</a>
      <a href="/index.php">Strona główna</a>
    </body></html>"#;

const FORUM_PAGE_1: &str = r#"
    <html><body>
      <a href="t,jan-kowalski,1">Jan Kowalski</a>
      <a href="t,jan-kowalski,1&amp;start=25">Jan Kowalski, strona 2</a>
      <a href="t,anna-nowak,2">Anna Nowak</a>
      <div class="pagination">
        <a class="postmenu" title="Dalej" href="viewforum.php?f=6&amp;start=25">»</a>
      </div>
    </body></html>"#;

const FORUM_PAGE_2: &str = r#"
    <html><body>
      <a href="t,anna-nowak,2">Anna Nowak</a>
      <a href="t,fizycy-zbiorczy,3">Fizycy zbiorczo</a>
      <div class="pagination">
        <a class="postmenu" title="Wstecz" href="viewforum.php?f=6">«</a>
      </div>
    </body></html>"#;

fn post(user: &str, date: Option<&str>, professor: (&str, &str), review: &str) -> String {
    let date = date
        .map(|d| format!(r#"<div class="post_date">{}</div>"#, d))
        .unwrap_or_default();
    format!(
        r#"<ul class="gradient_post"><li>
             <span itemprop="author">{user}</span>
             <div class="ll">Wydział: W4 Informatyki
               Rok studiów: 3</div>
             <span class="important_inline">Waga opinii: x1.5</span>
             {date}
             <span itemprop="givenName">{}</span> <span itemprop="familyName">{}</span>
             <span class="vote_rate">4</span>
             <span itemprop="ratingValue">4.5</span>
             <span itemprop="reviewBody"><span style="font-weight: bold">Kurs: Analiza</span>
               {review}</span>
           </li></ul>"#,
        professor.0, professor.1
    )
}

fn page(posts: &[String], next: Option<&str>) -> String {
    let pagination = next
        .map(|href| {
            format!(
                r#"<div class="pagination"><a class="postmenu" title="Dalej" href="{}">»</a></div>"#,
                href
            )
        })
        .unwrap_or_default();
    format!("<html><body>{}{}</body></html>", posts.join("\n"), pagination)
}

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body.into())
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/login.php"))
        .respond_with(html(LOGIN_PAGE))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/login.php"))
        .and(body_string_contains("username=tester"))
        .and(body_string_contains("autologin=on"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/index.php"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/index.php"))
        .respond_with(html("<html><body>Witaj</body></html>"))
        .mount(server)
        .await;
}

/// Mounts the opinions page, forum 6 and its topics
///
/// Topic 1 has two pages whose second page links back to the first. Topic 2
/// is listed on both forum pages but must be fetched once.
async fn mount_forum(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/opinie-o-prowadzacych"))
        .respond_with(html(OPINIONS_PAGE))
        .expect(1)
        .mount(server)
        .await;

    // More specific mock first: the first matching mock wins
    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "6"))
        .and(query_param("start", "25"))
        .respond_with(html(FORUM_PAGE_2))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "6"))
        .respond_with(html(FORUM_PAGE_1))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "7"))
        .respond_with(html(FORUM_PAGE_1))
        .expect(0)
        .mount(server)
        .await;

    let kowalski = ("Jan", "Kowalski");
    Mock::given(method("GET"))
        .and(path("/t,jan-kowalski,1"))
        .respond_with(html(page(
            &[
                post("ala", Some("2024-01-01, 10:00"), kowalski, "Wymagający, ale uczciwy."),
                post("ola", Some("2024-02-01, 12:30"), kowalski, "Świetne wykłady."),
            ],
            Some("t,jan-kowalski,1&amp;start=25"),
        )))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/t,jan-kowalski,1&start=25"))
        .respond_with(html(page(
            &[post("ela", Some("2024-03-01"), kowalski, "Polecam każdemu.")],
            Some("t,jan-kowalski,1"),
        )))
        .expect(1)
        .mount(server)
        .await;

    let nowak = ("Anna", "Nowak");
    Mock::given(method("GET"))
        .and(path("/t,anna-nowak,2"))
        .respond_with(html(page(
            &[
                post("iza", Some("2023-12-01"), nowak, "Dobre ćwiczenia."),
                post("bez-daty", None, nowak, "Ten wpis nie ma daty."),
            ],
            None,
        )))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/t,fizycy-zbiorczy,3"))
        .respond_with(html(page(&[], None)))
        .expect(0)
        .mount(server)
        .await;
}

fn test_config(base_url: &str, db_path: &Path, max_retries: u32) -> Config {
    parse_config(&format!(
        r#"
[forum]
base-url = "{base_url}/"

[crawler]
max-concurrent-requests = 4
download-delay = 0
full-scan-delay = 0
autothrottle-start-delay = 0
autothrottle-max-delay = 0
request-timeout = 5

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[keywords]
excluded = ["fizycy"]

[pipeline]
workers = 2

[retry]
max-retries = {max_retries}
base-delay = 0

[output]
database-path = "{db}"
"#,
        base_url = base_url,
        max_retries = max_retries,
        db = db_path.display()
    ))
    .expect("Failed to parse test config")
}

fn harvester(config: Config) -> Harvester {
    Harvester::new(config, Credentials::new("tester", "secret"))
        .with_detector(Arc::new(AlwaysPolish))
}

#[tokio::test]
async fn test_full_scan_harvests_every_dated_post() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_forum(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("reviews.db");
    let config = test_config(&server.uri(), &db_path, 0);

    let report = harvester(config).run("hash", true).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.attempts, 1);
    let crawl = report.crawl.unwrap();
    assert_eq!(crawl.forums, 1);
    assert_eq!(crawl.topics, 2);

    assert_eq!(report.metrics.opinions_scraped, 4);
    assert_eq!(report.metrics.opinions_errors, 0);
    assert_eq!(report.metrics.forum_pages, 2);
    assert_eq!(report.metrics.topic_pages, 3);
    assert_eq!(report.metrics.distinct_professors, 2);
    assert_eq!(report.pipeline.persisted, 4);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_reviews().unwrap(), 4);
    assert_eq!(
        storage.last_opinion_date().unwrap(),
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
    );

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.mode, "full");
    assert_eq!(run.opinions_scraped, 4);

    server.verify().await;
}

#[tokio::test]
async fn test_incremental_scan_skips_posts_up_to_checkpoint() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_forum(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("reviews.db");
    {
        let mut storage = SqliteStorage::new(&db_path).unwrap();
        storage
            .advance_checkpoint(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap())
            .unwrap();
    }
    let config = test_config(&server.uri(), &db_path, 0);

    let report = harvester(config).run("hash", false).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.metrics.opinions_scraped, 2);
    assert_eq!(report.pipeline.persisted, 2);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_reviews().unwrap(), 2);
    assert_eq!(
        storage.last_opinion_date().unwrap(),
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
    );
    assert_eq!(storage.get_latest_run().unwrap().unwrap().mode, "incremental");
}

#[tokio::test]
async fn test_failed_login_fails_run_without_crawling() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/login.php"))
        .respond_with(html(LOGIN_PAGE))
        .expect(2)
        .mount(&server)
        .await;

    // Wrong password: the forum shows the login page again instead of redirecting
    Mock::given(method("POST"))
        .and(path("/login.php"))
        .respond_with(html(LOGIN_PAGE))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/opinie-o-prowadzacych"))
        .respond_with(html(OPINIONS_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("reviews.db");
    let config = test_config(&server.uri(), &db_path, 1);

    let report = harvester(config).run("hash", true).await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.attempts, 2);
    assert!(report.error.unwrap().contains("Authentication failed"));

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_reviews().unwrap(), 0);
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.attempts, 2);

    server.verify().await;
}

/// A dated post whose review body is missing
const POST_WITHOUT_REVIEW: &str = r#"
    <ul class="gradient_post"><li>
      <span itemprop="author">pusty</span>
      <div class="post_date">2024-01-15, 09:00</div>
      <span itemprop="givenName">Jan</span> <span itemprop="familyName">Kowalski</span>
      <span itemprop="ratingValue">2.0</span>
    </li></ul>"#;

#[tokio::test]
async fn test_broken_post_is_counted_and_neighbours_are_kept() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/opinie-o-prowadzacych"))
        .respond_with(html(OPINIONS_PAGE))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "6"))
        .respond_with(html(
            r#"<html><body><a href="t,jan-kowalski,1">Jan Kowalski</a></body></html>"#,
        ))
        .mount(&server)
        .await;

    let kowalski = ("Jan", "Kowalski");
    Mock::given(method("GET"))
        .and(path("/t,jan-kowalski,1"))
        .respond_with(html(page(
            &[
                post("ala", Some("2024-01-01, 10:00"), kowalski, "Wymagający, ale uczciwy."),
                POST_WITHOUT_REVIEW.to_string(),
                post("ola", Some("2024-02-01, 12:30"), kowalski, "Świetne wykłady."),
            ],
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("reviews.db");
    let config = test_config(&server.uri(), &db_path, 0);

    let report = harvester(config).run("hash", true).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.metrics.opinions_errors, 1);
    assert_eq!(report.metrics.opinions_scraped, 2);
    assert_eq!(report.pipeline.persisted, 2);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_reviews().unwrap(), 2);
    assert_eq!(
        storage.last_opinion_date().unwrap(),
        Some(Utc.with_ymd_and_hms(2024, 2, 1, 12, 30, 0).unwrap())
    );
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.opinions_errors, 1);

    server.verify().await;
}

#[tokio::test]
async fn test_preset_abort_signal_aborts_run() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("reviews.db");
    let config = test_config(&server.uri(), &db_path, 3);

    let abort = Arc::new(AbortSignal::new());
    abort.abort();
    let report = harvester(config)
        .with_abort_signal(abort)
        .run("hash", true)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Aborted);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.metrics.opinions_scraped, 0);
}
