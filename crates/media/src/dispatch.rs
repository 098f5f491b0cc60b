use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

pub type Callback = Arc<dyn Fn() + Send + Sync>;
pub type PositionCallback = Arc<dyn Fn(Duration) + Send + Sync>;
pub type TitleCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Consumer callbacks. Cloned out of their lock before being invoked.
#[derive(Clone, Default)]
pub(crate) struct Callbacks {
    pub pre_roll: Option<Callback>,
    pub new_frame: Option<PositionCallback>,
    pub eos: Option<Callback>,
    pub paused: Option<Callback>,
    pub start_playing: Option<Callback>,
    pub title: Option<TitleCallback>,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs consumer callbacks in posting order on the "streamer-callbacks"
/// thread, off the GStreamer streaming threads.
pub(crate) struct Dispatcher {
    tx: Option<mpsc::Sender<Job>>,
}

impl Dispatcher {
    pub(crate) fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let spawned = std::thread::Builder::new()
            .name("streamer-callbacks".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
            });
        match spawned {
            Ok(_) => Self { tx: Some(tx) },
            Err(e) => {
                tracing::warn!(error = %e, "failed to spawn callback thread, running callbacks inline");
                Self { tx: None }
            }
        }
    }

    pub(crate) fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        match &self.tx {
            Some(tx) => {
                if let Err(mpsc::SendError(job)) = tx.send(Box::new(job)) {
                    job();
                }
            }
            None => job(),
        }
    }

    pub(crate) fn call(&self, callback: Option<Callback>) {
        if let Some(cb) = callback {
            self.dispatch(move || cb());
        }
    }
}
