//! Accessor surface of media tracks owned by the media engine.
//!
//! Nothing here participates in signaling; hosts use it next to a session to
//! mute tracks or tap their frames.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub type UserData = Arc<dyn Any + Send + Sync>;
pub type FrameCallback<F> = Box<dyn Fn(&F) + Send + Sync>;

pub trait MediaTrack {
    type Frame;

    fn set_user_data(&mut self, data: Option<UserData>);
    fn user_data(&self) -> Option<UserData>;

    /// Replaces any previously registered callback; `None` unregisters.
    fn register_frame_callback(&mut self, callback: Option<FrameCallback<Self::Frame>>);

    /// Disabling mutes the track without renegotiation.
    fn set_enabled(&mut self, enabled: bool);
    fn is_enabled(&self) -> bool;

    fn set_output_to_device(&mut self, output: bool);
    fn is_output_to_device(&self) -> bool;
}

/// Plain holder for track flags and callbacks.
pub struct TrackState<F> {
    user_data: Option<UserData>,
    callback: Option<FrameCallback<F>>,
    enabled: bool,
    output_to_device: bool,
}

impl<F> Default for TrackState<F> {
    fn default() -> Self {
        Self {
            user_data: None,
            callback: None,
            enabled: true,
            output_to_device: true,
        }
    }
}

impl<F> fmt::Debug for TrackState<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackState")
            .field("has_user_data", &self.user_data.is_some())
            .field("has_callback", &self.callback.is_some())
            .field("enabled", &self.enabled)
            .field("output_to_device", &self.output_to_device)
            .finish()
    }
}

impl<F> TrackState<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a frame to the registered callback, if any.
    pub fn deliver(&self, frame: &F) {
        if let Some(callback) = &self.callback {
            callback(frame);
        }
    }
}

impl<F> MediaTrack for TrackState<F> {
    type Frame = F;

    fn set_user_data(&mut self, data: Option<UserData>) {
        self.user_data = data;
    }

    fn user_data(&self) -> Option<UserData> {
        self.user_data.clone()
    }

    fn register_frame_callback(&mut self, callback: Option<FrameCallback<F>>) {
        self.callback = callback;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_output_to_device(&mut self, output: bool) {
        self.output_to_device = output;
    }

    fn is_output_to_device(&self) -> bool {
        self.output_to_device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn flags_default_on_and_toggle() {
        let mut track = TrackState::<Vec<i16>>::new();
        assert!(track.is_enabled());
        assert!(track.is_output_to_device());
        track.set_enabled(false);
        track.set_output_to_device(false);
        assert!(!track.is_enabled());
        assert!(!track.is_output_to_device());
    }

    #[test]
    fn user_data_round_trips() {
        let mut track = TrackState::<()>::new();
        assert!(track.user_data().is_none());
        track.set_user_data(Some(Arc::new(42_u32)));
        let data = track.user_data().expect("user data");
        assert_eq!(data.downcast_ref::<u32>(), Some(&42));
        track.set_user_data(None);
        assert!(track.user_data().is_none());
    }

    #[test]
    fn frames_reach_the_registered_callback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let mut track = TrackState::<Vec<i16>>::new();
        track.deliver(&vec![0; 480]);
        track.register_frame_callback(Some(Box::new(move |frame: &Vec<i16>| {
            counter.fetch_add(frame.len(), Ordering::SeqCst);
        })));
        track.deliver(&vec![0; 480]);
        track.register_frame_callback(None);
        track.deliver(&vec![0; 480]);
        assert_eq!(hits.load(Ordering::SeqCst), 480);
    }
}
