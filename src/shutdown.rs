//! Quit requests from Ctrl-C or a `q` typed on stdin.

use anyhow::{Context, Result};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared quit flag, polled once per frame by the loop.
#[derive(Clone, Debug, Default)]
pub struct QuitSignal {
    flag: Arc<AtomicBool>,
}

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Install the Ctrl-C handler and start the stdin watcher.
    pub fn install(&self) -> Result<()> {
        let on_signal = self.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupt received, stopping");
            on_signal.request();
        })
        .context("error setting Ctrl-C handler")?;

        let on_key = self.clone();
        std::thread::Builder::new()
            .name("quit-watcher".into())
            .spawn(move || watch_stdin(std::io::stdin().lock(), &on_key))
            .context("spawn stdin watcher")?;
        log::info!("press 'q' then Enter (or Ctrl-C) to quit");
        Ok(())
    }
}

/// Read lines until one is `q`/`Q` or the input closes.
pub fn watch_stdin<R: BufRead>(input: R, signal: &QuitSignal) {
    for line in input.lines() {
        let Ok(line) = line else {
            return;
        };
        if is_quit_key(&line) {
            signal.request();
            return;
        }
    }
}

fn is_quit_key(line: &str) -> bool {
    matches!(line.trim(), "q" | "Q")
}
