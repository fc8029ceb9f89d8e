//! Echoes every message straight back to where it came from.

use std::sync::Arc;

use crate::error::BotError;
use crate::event::ChatEvent;
use crate::plugin::{OutputSink, Plugin, PluginFuture};

pub struct Echo;

pub fn factory() -> Result<Arc<dyn Plugin>, BotError> {
    Ok(Arc::new(Echo))
}

impl Plugin for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn on_privmsg<'a>(&'a self, event: &'a ChatEvent, out: &'a OutputSink) -> PluginFuture<'a> {
        Box::pin(async move {
            out.reply(event, event.body.clone()).await;
            Ok(())
        })
    }
}
