use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Audible alert played when an alarm fires.
pub trait AlertSound: Send + Sync {
    fn play(&self);
    fn pause(&self);
    fn is_playing(&self) -> bool;
}

impl<T: AlertSound + ?Sized> AlertSound for Box<T> {
    fn play(&self) {
        (**self).play();
    }

    fn pause(&self) {
        (**self).pause();
    }

    fn is_playing(&self) -> bool {
        (**self).is_playing()
    }
}

/// Rings the terminal bell on stdout.
#[derive(Debug, Default)]
pub struct TerminalBell {
    playing: AtomicBool,
}

impl TerminalBell {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertSound for TerminalBell {
    fn play(&self) {
        self.playing.store(true, Ordering::Relaxed);
        let mut stdout = io::stdout().lock();
        if let Err(err) = stdout.write_all(b"\x07").and_then(|()| stdout.flush()) {
            debug!(error = %err, "terminal bell unavailable");
        }
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::Relaxed);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }
}

/// Tracks play/pause state without making a sound.
#[derive(Debug, Default)]
pub struct MutedAlert {
    playing: AtomicBool,
}

impl AlertSound for MutedAlert {
    fn play(&self) {
        self.playing.store(true, Ordering::Relaxed);
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::Relaxed);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }
}
