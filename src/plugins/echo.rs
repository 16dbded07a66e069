// ABOUTME: Echo plugin that repeats chat text back through the reply router
// ABOUTME: Reactions are answered with their name instead of the raw body

use anyhow::Result;
use async_trait::async_trait;
use halyard_core::{Event, Plugin, PluginHandler};
use std::sync::Arc;

pub const NAME: &str = "echo";

pub fn plugin() -> Plugin {
    Plugin::new(NAME, Arc::new(Echo))
}

struct Echo;

#[async_trait]
impl PluginHandler for Echo {
    async fn handle(&self, evt: Event) -> Result<()> {
        if evt.is_bot {
            return Ok(());
        }
        match evt.original.reaction() {
            Some(name) => evt.reply(format!("reaction: {}\n", name)).await,
            None => evt.reply(format!("{}\n", evt.body)).await,
        }
    }
}
