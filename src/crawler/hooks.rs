//! Ordered, fallible lifecycle hooks run around navigation.
//!
//! Hook arrays run strictly in registration order; a failing hook aborts the
//! remaining hooks in that phase (§5 Ordering guarantees). This is the
//! request-handling analogue of `browser::BrowserPoolHooks`, which fires
//! around browser/page lifecycle instead.

use futures::future::BoxFuture;

use crate::crawler::context::CrawlingContext;
use crate::error::Result;

type AsyncHook = Box<dyn for<'a> Fn(&'a mut CrawlingContext) -> BoxFuture<'a, Result<()>> + Send + Sync>;

#[derive(Default)]
pub struct Hooks {
    pre_navigation: Vec<AsyncHook>,
    post_navigation: Vec<AsyncHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pre_navigation<F>(&mut self, hook: F)
    where
        F: for<'a> Fn(&'a mut CrawlingContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.pre_navigation.push(Box::new(hook));
    }

    pub fn add_post_navigation<F>(&mut self, hook: F)
    where
        F: for<'a> Fn(&'a mut CrawlingContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.post_navigation.push(Box::new(hook));
    }

    pub async fn run_pre_navigation(&self, ctx: &mut CrawlingContext) -> Result<()> {
        for hook in &self.pre_navigation {
            hook(ctx).await?;
        }
        Ok(())
    }

    pub async fn run_post_navigation(&self, ctx: &mut CrawlingContext) -> Result<()> {
        for hook in &self.post_navigation {
            hook(ctx).await?;
        }
        Ok(())
    }
}
