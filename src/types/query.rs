//! Correlated query kinds and their results

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ColorCorrection, Offset};

/// Kinds of request that expect a reply from the device.
///
/// The wire protocol carries no request id, so replies are matched to
/// requests by kind, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum QueryKind {
    CameraOffset,
    GpsOffset,
    ColorCorrection,
}

impl QueryKind {
    pub const ALL: [QueryKind; 3] =
        [QueryKind::CameraOffset, QueryKind::GpsOffset, QueryKind::ColorCorrection];

    /// Keyword used both for the request and to tag the reply.
    pub fn keyword(self) -> &'static str {
        match self {
            QueryKind::CameraOffset => "getCameraOffset",
            QueryKind::GpsOffset => "getGpsOffset",
            QueryKind::ColorCorrection => "getColorCorrection",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.keyword() == keyword)
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Decoded reply to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum QueryResult {
    CameraOffset(Offset),
    GpsOffset(Offset),
    ColorCorrection(ColorCorrection),
}

impl QueryResult {
    pub fn kind(&self) -> QueryKind {
        match self {
            QueryResult::CameraOffset(_) => QueryKind::CameraOffset,
            QueryResult::GpsOffset(_) => QueryKind::GpsOffset,
            QueryResult::ColorCorrection(_) => QueryKind::ColorCorrection,
        }
    }
}
