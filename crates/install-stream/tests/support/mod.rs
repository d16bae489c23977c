#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::stream;
use install_stream::{
    ChannelError, ChannelSignal, ChannelStream, EventChannel, SessionSnapshot, StreamSession,
};
use tokio::sync::mpsc;

/// What the next `open` call does.
pub enum Script {
    Reject(ChannelError),
    /// Yields the signals, then the server closes the stream.
    Finite(Vec<ChannelSignal>),
    /// Yields the signals and stays open; more can be pushed with `sender`.
    Held(Vec<ChannelSignal>),
}

/// Scripted event channel. Unscripted opens behave like `Held(vec![])`.
pub struct FakeChannel {
    scripts: Mutex<VecDeque<Script>>,
    senders: Mutex<Vec<mpsc::UnboundedSender<ChannelSignal>>>,
    opens: AtomicUsize,
}

impl FakeChannel {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            senders: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Sender feeding the `index`-th held stream.
    pub fn sender(&self, index: usize) -> mpsc::UnboundedSender<ChannelSignal> {
        self.senders.lock().unwrap()[index].clone()
    }
}

#[async_trait::async_trait]
impl EventChannel for FakeChannel {
    async fn open(&self, _operation_id: &str) -> Result<ChannelStream, ChannelError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Held(Vec::new()));
        match script {
            Script::Reject(err) => Err(err),
            Script::Finite(signals) => Ok(Box::pin(stream::iter(signals))),
            Script::Held(signals) => {
                let (tx, rx) = mpsc::unbounded_channel();
                for signal in signals {
                    let _ = tx.send(signal);
                }
                self.senders.lock().unwrap().push(tx);
                Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|signal| (signal, rx))
                })))
            }
        }
    }
}

pub fn message(text: &str, level: &str) -> ChannelSignal {
    ChannelSignal::Message(serde_json::json!({ "Text": text, "Level": level }).to_string())
}

pub fn install_sequence() -> Vec<ChannelSignal> {
    vec![
        message("Téléchargement en cours", "info"),
        message("Extraction réussie", "info"),
        message("Installation des fichiers en cours", "info"),
        message("Installation terminée avec succès", "success"),
    ]
}

/// Polls the session until `done` holds. Panics after five (virtual) seconds.
pub async fn wait_for(
    session: &StreamSession,
    done: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let poll = async {
        loop {
            let snapshot = session.snapshot().await.expect("snapshot");
            if done(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .expect("session did not reach the expected state")
}
