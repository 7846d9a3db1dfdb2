//! Deterministic names for sync announcements and published data.
//!
//! ```text
//! group-oriented:   /<group>/[marker]/<source>/seq=N
//! source-oriented:  /<source>/<group>/[marker]/seq=N
//! sync prefix:      /<group>/sync
//! ```
//!
//! Publisher and fetchers must agree on the scheme and marker.

use serde::{Deserialize, Serialize};
use svs_core::{Component, Name};

/// Default data-type marker component.
pub const DEFAULT_DATA_MARKER: &str = "data";

/// Whether the group or the source leads a data name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingScheme {
    #[default]
    GroupOriented,
    SourceOriented,
}

/// Builds data names for one sync group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNaming {
    group: Name,
    marker: Option<Component>,
    scheme: NamingScheme,
}

impl DataNaming {
    pub fn new(group: Name, scheme: NamingScheme) -> Self {
        Self {
            group,
            marker: Some(Component::generic(DEFAULT_DATA_MARKER.as_bytes().to_vec())),
            scheme,
        }
    }

    /// Replace the data marker. `None` omits the component entirely.
    pub fn with_marker(mut self, marker: Option<&str>) -> Self {
        self.marker = marker.map(|m| Component::generic(m.as_bytes().to_vec()));
        self
    }

    pub fn group(&self) -> &Name {
        &self.group
    }

    pub fn scheme(&self) -> NamingScheme {
        self.scheme
    }

    /// Prefix of sync announcements for this group.
    pub fn sync_prefix(&self) -> Name {
        self.group.with(Component::generic(b"sync".to_vec()))
    }

    /// Name of `source`'s packet number `seq`.
    pub fn data_name(&self, source: &Name, seq: u64) -> Name {
        self.serving_prefix(source)
            .join(&self.source_suffix(source))
            .with(Component::sequence_number(seq))
    }

    /// Prefix under which data for `source` is requested and served.
    ///
    /// Group-oriented naming shares one prefix across all sources, so a
    /// node answering there can also serve packets it cached from others.
    pub fn serving_prefix(&self, source: &Name) -> Name {
        let base = match self.scheme {
            NamingScheme::GroupOriented => self.group.clone(),
            NamingScheme::SourceOriented => source.join(&self.group),
        };
        match &self.marker {
            Some(marker) => base.with(marker.clone()),
            None => base,
        }
    }

    fn source_suffix(&self, source: &Name) -> Name {
        match self.scheme {
            NamingScheme::GroupOriented => source.clone(),
            NamingScheme::SourceOriented => Name::new(),
        }
    }
}
