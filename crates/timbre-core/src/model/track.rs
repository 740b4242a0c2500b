//! Track nodes and their attribute vocabulary.

use crate::model::graph::Node;
use crate::model::ids::NodeId;
use crate::model::property::PropertyMap;

/// Node label carried by every track.
pub const TRACK_LABEL: &str = "Track";

/// Edge label of the derived similarity relation.
pub const MATCHED_LABEL: &str = "MATCHED";

/// Edge property holding the similarity score.
pub const SIM_SCORE: &str = "sim_score";

pub const ID: &str = "id";
pub const NAME: &str = "name";
pub const ARTIST: &str = "artist";
pub const ALBUM: &str = "album";
pub const GENRE: &str = "genre";
pub const EXPLICIT: &str = "explicit";

/// Identifying and categorical attributes. Never part of a feature vector.
pub const CATEGORICAL_ATTRIBUTES: &[&str] = &[ID, ARTIST, ALBUM, NAME, GENRE];

/// Numeric audio attributes of a track.
pub const NUMERIC_ATTRIBUTES: &[&str] = &[
    "popularity",
    "duration_ms",
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
    "time_signature",
];

/// Read-only view of a track node.
#[derive(Debug, Clone, Copy)]
pub struct Track<'a> {
    node: &'a Node,
}

impl<'a> Track<'a> {
    #[must_use]
    pub const fn new(node: &'a Node) -> Self {
        Self { node }
    }

    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.node.id
    }

    #[must_use]
    pub fn name(&self) -> &'a str {
        self.text(NAME)
    }

    #[must_use]
    pub fn artist(&self) -> &'a str {
        self.text(ARTIST)
    }

    #[must_use]
    pub fn explicit(&self) -> Option<bool> {
        self.node.property(EXPLICIT).and_then(|v| v.as_bool())
    }

    #[must_use]
    pub const fn properties(&self) -> &'a PropertyMap {
        &self.node.properties
    }

    fn text(&self, key: &str) -> &'a str {
        self.node
            .properties
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeId;
    use crate::props;

    #[test]
    fn test_track_accessors() {
        let node = Node {
            id: NodeId::new(1),
            label: TRACK_LABEL.to_string(),
            properties: props! {
                "name" => "Song 2",
                "artist" => "Blur",
                "explicit" => true,
                "tempo" => 130.0,
            },
        };
        let track = Track::new(&node);
        assert_eq!(track.id(), NodeId::new(1));
        assert_eq!(track.name(), "Song 2");
        assert_eq!(track.artist(), "Blur");
        assert_eq!(track.explicit(), Some(true));
    }

    #[test]
    fn test_missing_text_is_empty() {
        let node = Node {
            id: NodeId::new(2),
            label: TRACK_LABEL.to_string(),
            properties: PropertyMap::new(),
        };
        let track = Track::new(&node);
        assert_eq!(track.name(), "");
        assert_eq!(track.explicit(), None);
    }
}
