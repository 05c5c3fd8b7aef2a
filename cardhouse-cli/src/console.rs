//! Terminal notifier: prints messages and reads confirmations from stdin.

use std::io::Write;

use async_trait::async_trait;
use cardhouse_core::Notifier;
use tokio::io::{AsyncBufReadExt, BufReader};

pub struct ConsoleNotifier {
    assume_yes: bool,
}

impl ConsoleNotifier {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    async fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            println!("{} [y/N] y", message);
            return true;
        }

        print!("{} [y/N] ", message);
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut line).await {
            Ok(_) => is_yes(&line),
            Err(e) => {
                tracing::warn!("Failed to read answer: {}", e);
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn show(&self, message: &str) {
        println!("{}", message);
    }

    async fn ask(&self, message: &str) -> bool {
        self.confirm(message).await
    }

    async fn prompt(&self, message: &str) -> bool {
        self.confirm(message).await
    }
}
