//! # Terminal Adapter
//!
//! Line-oriented chat loop on stdin/stdout. Every line is one turn;
//! streamed deltas are printed as they arrive. Errors go to stderr and
//! the loop carries on with history unchanged.

use std::io::{self, Write};

use futures::StreamExt;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use chatter::core::{Conversation, CredentialSource};
use chatter::inference::{Image, RequestOptions};

pub struct Repl {
    pub conversation: Conversation,
    pub credentials: Box<dyn CredentialSource>,
    pub provider: String,
    pub stream: bool,
    /// Attached to the first query only.
    pub pending_image: Option<Image>,
}

impl Repl {
    fn turn_options(&mut self) -> RequestOptions {
        RequestOptions {
            // looked up every turn so a key exported mid-session is picked up
            api_key: self.credentials.api_key(&self.provider),
            image: self.pending_image.take(),
            ..Default::default()
        }
    }

    async fn turn(&mut self, query: &str) {
        let options = self.turn_options();
        let image = options.image.clone();

        let outcome = if self.stream {
            self.stream_turn(query, &options).await
        } else {
            self.conversation.reply(query, &options).await.map(|text| {
                println!("{text}");
            })
        };

        if let Err(e) = outcome {
            warn!("Turn failed: {}", e);
            eprintln!("error: {e}");
            // the turn was discarded, so offer the image again next time
            if self.pending_image.is_none() {
                self.pending_image = image;
            }
        }
    }

    async fn stream_turn(
        &mut self,
        query: &str,
        options: &RequestOptions,
    ) -> Result<(), chatter::inference::ProviderError> {
        let mut stream = self.conversation.stream(query, options)?;
        let mut stdout = io::stdout();
        while let Some(delta) = stream.next().await {
            match delta {
                Ok(delta) => {
                    print!("{delta}");
                    let _ = stdout.flush();
                }
                Err(e) => {
                    println!();
                    return Err(e);
                }
            }
        }
        println!();
        Ok(())
    }

    pub async fn run(mut self) -> io::Result<()> {
        println!(
            "chatter ({}) | system: {} | /quit to exit",
            self.provider,
            self.conversation.system()
        );
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("> ");
            io::stdout().flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let query = line.trim();
            match query {
                "" => continue,
                "/quit" | "/exit" => break,
                "/history" => {
                    println!("{} turns", self.conversation.history().len() / 2);
                    continue;
                }
                _ => self.turn(query).await,
            }
        }

        info!(
            "Session {} ended with {} messages",
            self.conversation.id(),
            self.conversation.history().len()
        );
        Ok(())
    }
}
