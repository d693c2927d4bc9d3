/// Interrupt handling.
///
/// The first Ctrl-C sets a process-wide, one-shot exit flag. Nothing reacts to
/// it while a child is running (the terminal delivers the interrupt to the
/// child too); the restart countdown polls it and stops supervising.
/// Later interrupts are swallowed by the handler and ignored.
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// One-shot "exit requested" flag shared between the listener and the countdown.
///
/// Clones observe the same flag. Once set it stays set.
#[derive(Debug, Clone)]
pub struct ExitSignal {
    tx: watch::Sender<bool>,
}

impl ExitSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Request exit. Idempotent.
    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the flag is set (immediately if it already is).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|set| *set).await;
    }
}

impl Default for ExitSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task that turns the first interrupt into an exit request.
pub struct SignalListener {
    handle: JoinHandle<()>,
}

impl SignalListener {
    /// Register the interrupt handler and start listening.
    ///
    /// Registration happens before this returns, so an interrupt arriving
    /// right after (e.g. while the first child is starting) is not lost.
    pub fn install(exit: ExitSignal) -> std::io::Result<SignalListener> {
        #[cfg(unix)]
        let handle = {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = signal(SignalKind::interrupt())?;
            tokio::spawn(async move {
                if sigint.recv().await.is_some() {
                    tracing::info!("interrupt received, exiting after the current run");
                    exit.set();
                }
            })
        };

        #[cfg(not(unix))]
        let handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("interrupt received, exiting after the current run");
                    exit.set();
                }
                Err(e) => tracing::warn!(error = %e, "failed to listen for Ctrl-C"),
            }
        });

        tracing::debug!("interrupt listener installed");
        Ok(SignalListener { handle })
    }

    /// Whether the listener has already seen its interrupt.
    #[allow(dead_code)]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
