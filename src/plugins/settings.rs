// ABOUTME: Settings plugin that shows resolved instance settings and stored preferences
// ABOUTME: Answers the "settings" and "prefs" keywords with UTF-8 tables

use anyhow::Result;
use async_trait::async_trait;
use halyard_core::{Event, Plugin, PluginHandler, Setting, REPLY_VIA_DM};
use std::sync::Arc;

pub const NAME: &str = "settings";

pub fn plugin() -> Plugin {
    Plugin::new(NAME, Arc::new(SettingsHandler))
        .with_setting(Setting::new(REPLY_VIA_DM, "false"))
        .with_setting(Setting::new("greeting", "hello"))
}

struct SettingsHandler;

#[async_trait]
impl PluginHandler for SettingsHandler {
    async fn handle(&self, evt: Event) -> Result<()> {
        let argv = evt.body_as_argv();
        match argv.first().map(String::as_str) {
            Some("settings") if argv.len() == 1 => {
                let header = vec!["Key".to_string(), "Value".to_string(), "Default".to_string()];
                let rows: Vec<Vec<String>> = evt
                    .instance_settings()?
                    .iter()
                    .map(|p| vec![p.key.clone(), p.value.clone(), p.default.clone()])
                    .collect();
                evt.reply_table(&header, &rows).await
            }
            Some("prefs") if argv.len() == 1 => {
                let prefs = evt.find_prefs()?;
                if prefs.is_empty() {
                    return evt.reply("no preferences stored\n").await;
                }
                let (header, rows) = prefs.to_table();
                evt.reply_table(&header, &rows).await
            }
            _ => Ok(()),
        }
    }
}
