//! Playlist selection for the in-store music task.

use serde::{Deserialize, Serialize};

use crate::error::Notice;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: u32,
    pub name: String,
    pub description: String,
}

impl Playlist {
    pub fn new(id: u32, name: &str, description: &str) -> Self {
        Playlist { id, name: name.to_string(), description: description.to_string() }
    }
}

/// What is currently playing. Nothing here is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playback {
    selected: Option<Playlist>,
}

impl Playback {
    pub fn select(&mut self, playlist: &Playlist) -> Notice {
        self.selected = Some(playlist.clone());
        Notice::success("Music Started", format!("Now playing: {}", playlist.name))
    }

    pub fn stop(&mut self) -> Notice {
        self.selected = None;
        Notice::info("Music Stopped", "Playback ended")
    }

    pub fn now_playing(&self) -> Option<&Playlist> {
        self.selected.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.selected.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_then_stop() {
        let mut playback = Playback::default();
        let list = Playlist::new(2, "Island Vibes", "Authentic Hawaiian music");
        let notice = playback.select(&list);
        assert_eq!(notice.message, "Now playing: Island Vibes");
        assert_eq!(playback.now_playing(), Some(&list));
        playback.stop();
        assert!(!playback.is_playing());
    }
}
