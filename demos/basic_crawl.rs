//! Example: crawl a small site with plain HTTP requests, following links and
//! collecting page titles into a dataset.

use std::sync::Arc;

use autoscrape::crawler::{BasicCrawler, CrawlerHandles, EnqueueLinksOptions};
use autoscrape::{
    AutoscaledPool, AutoscaledPoolOptions, CrawlerOptions, Request, RequestQueue, Snapshotter, SnapshotterOptions,
    SystemStatus,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let queue = Arc::new(RequestQueue::new_in_memory());
    queue
        .add_request(Request::new("https://example.com"), false)
        .await?;

    let handles = Arc::new(CrawlerHandles::in_memory().with_request_queue(queue.clone()));

    let crawler = Arc::new(BasicCrawler::new_basic(
        queue,
        handles.clone(),
        CrawlerOptions::default(),
        Box::new(|ctx| {
            Box::pin(async move {
                let html = match &ctx.page {
                    Some(page) => page.content().await.unwrap_or_default(),
                    None => String::new(),
                };
                ctx.push_data(serde_json::json!({
                    "url": ctx.request.url,
                    "length": html.len(),
                }))
                .await?;
                ctx.enqueue_links(EnqueueLinksOptions::default()).await?;
                Ok(())
            })
        }),
    ));

    let snapshotter = Arc::new(Snapshotter::new(SnapshotterOptions::default()));
    let system_status = Arc::new(SystemStatus::new(snapshotter));
    let pool = AutoscaledPool::new(
        crawler,
        system_status,
        AutoscaledPoolOptions {
            max_concurrency: 10,
            ..Default::default()
        },
    );

    let stats = pool.run().await?;
    println!(
        "crawl finished: {} succeeded, {} failed",
        stats.tasks_succeeded, stats.tasks_failed
    );

    for item in handles.dataset.items().await {
        println!("{item}");
    }

    Ok(())
}
