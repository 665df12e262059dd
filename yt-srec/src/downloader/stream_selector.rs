//! Stream selection based on a preferred quality.
//!
//! Picks the HLS variant whose height is closest to (but not above) the
//! requested quality.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Requested capture quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Quality {
    /// Highest available variant.
    #[default]
    Best,
    /// Highest variant not taller than this many pixels.
    Height(u32),
}

/// Heights accepted as `<height>p` quality labels.
pub const KNOWN_HEIGHTS: [u32; 8] = [2160, 1440, 1080, 720, 480, 360, 240, 144];

impl Quality {
    pub fn preferred_height(&self) -> Option<u32> {
        match self {
            Self::Best => None,
            Self::Height(h) => Some(*h),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Best => "best".to_string(),
            Self::Height(h) => format!("{}p", h),
        }
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "best" {
            return Ok(Self::Best);
        }
        s.strip_suffix('p')
            .and_then(|h| h.parse::<u32>().ok())
            .filter(|h| KNOWN_HEIGHTS.contains(h))
            .map(Self::Height)
            .ok_or_else(|| Error::config(format!("Unknown video quality: {}", s)))
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One media format as reported by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamFormat {
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Total bitrate in kbit/s.
    #[serde(default)]
    pub tbr: Option<f64>,
}

impl StreamFormat {
    /// Playable HLS variant with a URL.
    pub fn is_hls(&self) -> bool {
        matches!(self.protocol.as_deref(), Some("m3u8") | Some("m3u8_native")) && self.url.is_some()
    }

    fn rank(&self) -> (u32, f64) {
        (self.height.unwrap_or(0), self.tbr.unwrap_or(0.0))
    }
}

fn compare_rank(a: &StreamFormat, b: &StreamFormat) -> Ordering {
    let (ah, at) = a.rank();
    let (bh, bt) = b.rank();
    ah.cmp(&bh).then(at.partial_cmp(&bt).unwrap_or(Ordering::Equal))
}

/// Select the HLS format to capture for `quality`.
///
/// Prefers the highest (height, bitrate) variant at or below the preferred
/// height; falls back to the overall highest variant.
pub fn select_hls_format(formats: &[StreamFormat], quality: Quality) -> Option<&StreamFormat> {
    let hls = || formats.iter().filter(|f| f.is_hls());

    if let Some(preferred) = quality.preferred_height()
        && let Some(best_fit) = hls()
            .filter(|f| f.height.unwrap_or(0) <= preferred)
            .max_by(|a, b| compare_rank(a, b))
    {
        return Some(best_fit);
    }

    hls().max_by(|a, b| compare_rank(a, b))
}

/// Distinct HLS heights, tallest first.
pub fn available_heights(formats: &[StreamFormat]) -> Vec<u32> {
    let mut heights: Vec<u32> = formats
        .iter()
        .filter(|f| f.is_hls())
        .filter_map(|f| f.height)
        .collect();
    heights.sort_unstable_by(|a, b| b.cmp(a));
    heights.dedup();
    heights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hls(height: u32, tbr: f64) -> StreamFormat {
        StreamFormat {
            protocol: Some("m3u8_native".to_string()),
            url: Some(format!("https://cdn/{}_{}.m3u8", height, tbr)),
            height: Some(height),
            tbr: Some(tbr),
        }
    }

    #[test]
    fn test_quality_parse() {
        assert_eq!("best".parse::<Quality>().unwrap(), Quality::Best);
        assert_eq!("720p".parse::<Quality>().unwrap(), Quality::Height(720));
        assert_eq!(" 1080P ".parse::<Quality>().unwrap(), Quality::Height(1080));
        assert!("999p".parse::<Quality>().is_err());
        assert!("hd".parse::<Quality>().is_err());
        assert_eq!(Quality::Height(480).to_string(), "480p");
    }

    #[test]
    fn test_select_best_fit_below_preferred_height() {
        let formats = vec![hls(1080, 4500.0), hls(720, 2500.0), hls(720, 3000.0), hls(480, 1200.0)];
        let selected = select_hls_format(&formats, Quality::Height(720)).unwrap();
        assert_eq!(selected.height, Some(720));
        assert_eq!(selected.tbr, Some(3000.0));
    }

    #[test]
    fn test_select_falls_back_to_highest_when_nothing_fits() {
        let formats = vec![hls(1080, 4500.0), hls(720, 2500.0)];
        let selected = select_hls_format(&formats, Quality::Height(144)).unwrap();
        assert_eq!(selected.height, Some(1080));
    }

    #[test]
    fn test_select_best_ignores_non_hls() {
        let mut dash = hls(2160, 9000.0);
        dash.protocol = Some("https".to_string());
        let formats = vec![dash, hls(1080, 4500.0)];

        let selected = select_hls_format(&formats, Quality::Best).unwrap();
        assert_eq!(selected.height, Some(1080));
        assert_eq!(available_heights(&formats), vec![1080]);
    }

    #[test]
    fn test_select_none_without_hls() {
        let formats = vec![StreamFormat {
            protocol: Some("m3u8".to_string()),
            url: None,
            height: Some(720),
            tbr: None,
        }];
        assert!(select_hls_format(&formats, Quality::Best).is_none());
    }

    #[test]
    fn test_available_heights_dedup_sorted() {
        let formats = vec![hls(480, 1.0), hls(1080, 2.0), hls(480, 3.0), hls(720, 4.0)];
        assert_eq!(available_heights(&formats), vec![1080, 720, 480]);
    }
}
