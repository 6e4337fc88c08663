//! End-to-end crawl scenarios against local `wiremock` servers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request as WireRequest, Respond, ResponseTemplate};

use autoscrape::crawler::{BasicCrawler, CrawlerHandles, EnqueueLinksOptions};
use autoscrape::{
    AutoscaledPool, AutoscaledPoolOptions, CrawlerOptions, EventBus, Request, RequestQueue, SessionPool,
    SessionPoolOptions, Snapshotter, SnapshotterOptions, SystemStatus,
};

fn fresh_system_status() -> Arc<SystemStatus> {
    Arc::new(SystemStatus::new(Arc::new(Snapshotter::new(SnapshotterOptions::default()))))
}

/// S1 — static list of three URLs, no browser, dataset ends up with exactly
/// three items and concurrency never exceeds the configured cap.
#[tokio::test]
async fn scenario_s1_static_list_no_browser() {
    let server = MockServer::start().await;
    for p in ["/1", "/2", "/3"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("ok-{p}")))
            .mount(&server)
            .await;
    }

    let queue = Arc::new(RequestQueue::new_in_memory());
    for p in ["/1", "/2", "/3"] {
        queue
            .add_request(Request::new(format!("{}{}", server.uri(), p)), false)
            .await
            .unwrap();
    }
    let handles = Arc::new(CrawlerHandles::in_memory());

    let crawler = Arc::new(BasicCrawler::new_basic(
        queue,
        handles.clone(),
        CrawlerOptions::default(),
        Box::new(|ctx| {
            Box::pin(async move {
                let body = match &ctx.page {
                    Some(page) => page.content().await?,
                    None => String::new(),
                };
                ctx.push_data(json!({"url": ctx.request.url, "body": body})).await
            })
        }),
    ));

    let pool = AutoscaledPool::new(
        crawler,
        fresh_system_status(),
        AutoscaledPoolOptions {
            max_concurrency: 2,
            desired_concurrency: 2,
            ..Default::default()
        },
    );
    let stats = pool.run().await.unwrap();

    assert_eq!(stats.tasks_succeeded, 3);
    assert_eq!(stats.tasks_failed, 0);
    assert_eq!(handles.dataset.len().await, 3);
}

/// S2 — recursive crawl: `/` links to `/a` and `/b`, both of which link back
/// to `/`. Dedup by unique key means exactly three uniqueKeys ever get
/// handled, none twice.
#[tokio::test]
async fn scenario_s2_recursive_crawl_with_queue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a href="/a">a</a><a href="/b">b</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a href="/">home</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a href="/">home</a>"#))
        .mount(&server)
        .await;

    let queue = Arc::new(RequestQueue::new_in_memory());
    queue.add_request(Request::new(server.uri()), false).await.unwrap();
    let handles = Arc::new(CrawlerHandles::in_memory().with_request_queue(queue.clone()));

    let crawler = Arc::new(BasicCrawler::new_basic(
        queue,
        handles.clone(),
        CrawlerOptions::default(),
        Box::new(|ctx| {
            Box::pin(async move {
                ctx.push_data(json!({"url": ctx.request.url})).await?;
                ctx.enqueue_links(EnqueueLinksOptions::default()).await?;
                Ok(())
            })
        }),
    ));

    let pool = AutoscaledPool::new(crawler, fresh_system_status(), AutoscaledPoolOptions::default());
    let stats = pool.run().await.unwrap();

    assert_eq!(stats.tasks_succeeded, 3);
    assert_eq!(handles.dataset.len().await, 3);
}

/// Returns 500 for its first two hits, then 200.
struct FlakyThenOk {
    hits: AtomicU32,
}

impl Respond for FlakyThenOk {
    fn respond(&self, _request: &WireRequest) -> ResponseTemplate {
        let n = self.hits.fetch_add(1, Ordering::SeqCst);
        if n < 2 {
            ResponseTemplate::new(500)
        } else {
            ResponseTemplate::new(200).set_body_string("ok")
        }
    }
}

/// S3 — transient failures retried up to the budget, request ends handled
/// (not failed), handler invoked once per attempt.
#[tokio::test]
async fn scenario_s3_transient_failure_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(FlakyThenOk { hits: AtomicU32::new(0) })
        .mount(&server)
        .await;

    let queue = Arc::new(RequestQueue::new_in_memory());
    queue
        .add_request(Request::new(format!("{}/flaky", server.uri())), false)
        .await
        .unwrap();
    let handles = Arc::new(CrawlerHandles::in_memory());
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_in_handler = attempts.clone();
    let session_pool = Arc::new(SessionPool::new(SessionPoolOptions::default(), Arc::new(EventBus::new())));

    let mut options = CrawlerOptions::default();
    options.max_request_retries = 3;

    let crawler = BasicCrawler::new_basic(
        queue.clone(),
        handles.clone(),
        options,
        Box::new(move |ctx| {
            let attempts = attempts_in_handler.clone();
            Box::pin(async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                match ctx.status_code {
                    Some(500) => Err(autoscrape::CrawlerError::RequestHandler("upstream 500".into())),
                    _ => ctx.push_data(json!({"url": ctx.request.url})).await,
                }
            })
        }),
    )
    .with_session_pool(session_pool.clone());

    // Attempt 1 and 2 fail (500, reclaimed); attempt 3 succeeds. The 500s
    // each taint the session (`CrawlerError::RequestHandler::taints_session`)
    // without crossing the retirement threshold, so the same session is
    // reused throughout and its error score rises then partly recovers.
    crawler.run_task().await.unwrap();
    assert!(!queue.is_finished().await.unwrap());
    let after_first_failure = session_pool.persist_state().await;
    assert_eq!(after_first_failure.len(), 1);
    assert_eq!(after_first_failure[0].2, 1.0, "one mark_bad should raise the error score to 1.0");

    crawler.run_task().await.unwrap();
    assert!(!queue.is_finished().await.unwrap());
    let after_second_failure = session_pool.persist_state().await;
    assert_eq!(after_second_failure.len(), 1, "still below the retirement threshold, same session reused");
    assert_eq!(after_second_failure[0].2, 2.0, "a second mark_bad should raise the error score to 2.0");

    crawler.run_task().await.unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(queue.is_finished().await.unwrap());
    assert_eq!(handles.dataset.len().await, 1);
    assert_eq!(crawler.handled_count(), 1);

    let after_success = session_pool.persist_state().await;
    assert_eq!(after_success.len(), 1);
    assert_eq!(after_success[0].2, 1.5, "mark_good on success should pull the error score back down by 0.5");
    assert!(!session_pool.is_retired(&after_success[0].0).await);
}

/// S4 — a blocked status retires the session handling the request; the
/// request is reclaimed (not counted against its retry budget), and the next
/// attempt draws a freshly created session.
#[tokio::test]
async fn scenario_s4_blocked_status_retires_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blocked"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let queue = Arc::new(RequestQueue::new_in_memory());
    queue
        .add_request(Request::new(format!("{}/blocked", server.uri())), false)
        .await
        .unwrap();
    let handles = Arc::new(CrawlerHandles::in_memory());
    let session_pool = Arc::new(SessionPool::new(SessionPoolOptions::default(), Arc::new(EventBus::new())));

    let crawler = BasicCrawler::new_basic(
        queue.clone(),
        handles,
        CrawlerOptions::default(),
        Box::new(|ctx| Box::pin(async move { ctx.push_data(json!({"url": ctx.request.url})).await })),
    )
    .with_session_pool(session_pool.clone());

    crawler.run_task().await.unwrap();
    let after_first = session_pool.persist_state().await;
    assert_eq!(after_first.len(), 1, "first attempt should have created exactly one session");
    assert_eq!(
        after_first[0].2,
        SessionPoolOptions::default().session_max_error_score,
        "blocked session should be retired (error_score pinned to the max)"
    );
    assert!(!queue.is_finished().await.unwrap(), "blocked request is reclaimed, not handled");

    crawler.run_task().await.unwrap();
    let after_second = session_pool.persist_state().await;
    assert_eq!(
        after_second.len(),
        2,
        "second attempt should draw a freshly created session, not the retired one"
    );
}
