use serde::{Deserialize, Serialize};

/// Every generated video is cut into this many equal shots.
pub const SHOT_COUNT: usize = 12;

/// Theme used when the lyric text has no usable lines.
pub const FALLBACK_THEME: &str = "fun colorful scene";

/// A chorus is a lyric line that recurs verbatim (case-insensitive) and is at
/// least this many characters long.
const MIN_CHORUS_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraMode {
    Wide,
    Medium,
    Close,
}

impl CameraMode {
    /// Vertical field of view for this framing.
    pub fn fov_degrees(self) -> f64 {
        match self {
            CameraMode::Close => 35.0,
            CameraMode::Medium => 50.0,
            CameraMode::Wide => 65.0,
        }
    }

    fn for_shot(index: usize) -> Self {
        match index % 3 {
            0 => CameraMode::Wide,
            1 => CameraMode::Medium,
            _ => CameraMode::Close,
        }
    }
}

/// One fixed time interval of the output video with an assigned camera
/// framing and thematic backdrop. Shots are immutable once generated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Shot {
    pub id: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub camera: CameraMode,
    pub theme: String,
}

/// Split lyric text into non-empty trimmed lines.
pub fn lyric_lines(lyrics: &str) -> Vec<String> {
    lyrics
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// First lyric line whose lowercase text recurs at a later position and is at
/// least [`MIN_CHORUS_LEN`] characters long.
pub fn find_chorus(lines: &[String]) -> Option<String> {
    let lower: Vec<String> = lines.iter().map(|l| l.to_lowercase()).collect();
    for (i, a) in lower.iter().enumerate() {
        if a.chars().count() < MIN_CHORUS_LEN {
            continue;
        }
        if lower[i + 1..].iter().any(|b| b == a) {
            return Some(lines[i].clone());
        }
    }
    None
}

/// Partition `[0, duration)` into exactly [`SHOT_COUNT`] equal shots.
///
/// Camera framing cycles wide/medium/close. Shots at `i % 3 == 1` use the
/// chorus as theme when one exists; all others cycle through the lyric
/// lines, falling back to [`FALLBACK_THEME`] with no lyrics at all.
/// Pure function of its inputs.
pub fn build_storyboard(duration_seconds: f64, lyrics: &str) -> Vec<Shot> {
    let lines = lyric_lines(lyrics);
    let chorus = find_chorus(&lines);

    (0..SHOT_COUNT)
        .map(|i| {
            let theme = match (&chorus, i % 3) {
                (Some(chorus), 1) => chorus.clone(),
                _ if !lines.is_empty() => lines[i % lines.len()].clone(),
                _ => FALLBACK_THEME.to_string(),
            };
            // The last shot ends exactly at the track duration; the shared
            // boundary formula does not always round back to it.
            let end_seconds = if i + 1 == SHOT_COUNT {
                duration_seconds
            } else {
                duration_seconds * (i + 1) as f64 / SHOT_COUNT as f64
            };
            Shot {
                id: format!("shot_{:02}", i + 1),
                start_seconds: duration_seconds * i as f64 / SHOT_COUNT as f64,
                end_seconds,
                camera: CameraMode::for_shot(i),
                theme,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_twelve_shots_partitioning_duration() {
        let shots = build_storyboard(187.3, "");
        assert_eq!(shots.len(), SHOT_COUNT);
        assert_eq!(shots[0].start_seconds, 0.0);
        assert_eq!(shots[SHOT_COUNT - 1].end_seconds, 187.3);
        for pair in shots.windows(2) {
            assert_eq!(pair[0].end_seconds, pair[1].start_seconds);
        }
    }

    #[test]
    fn camera_cycles_wide_medium_close() {
        let shots = build_storyboard(60.0, "");
        assert_eq!(shots[0].camera, CameraMode::Wide);
        assert_eq!(shots[1].camera, CameraMode::Medium);
        assert_eq!(shots[2].camera, CameraMode::Close);
        assert_eq!(shots[3].camera, CameraMode::Wide);
    }

    #[test]
    fn chorus_is_first_long_duplicate() {
        let lines = lyric_lines("go go go\nverse one\ngo go go");
        assert_eq!(find_chorus(&lines).as_deref(), Some("go go go"));
    }

    #[test]
    fn chorus_match_is_case_insensitive() {
        let lines = lyric_lines("Hold The Line\nsomething else\nhold the line");
        assert_eq!(find_chorus(&lines).as_deref(), Some("Hold The Line"));
    }

    #[test]
    fn short_duplicates_are_not_a_chorus() {
        let lines = lyric_lines("na na\nverse\nna na");
        assert!(find_chorus(&lines).is_none());
    }

    #[test]
    fn chorus_lands_on_middle_of_each_camera_cycle() {
        let shots = build_storyboard(120.0, "go go go gone\nverse one\ngo go go gone");
        for (i, shot) in shots.iter().enumerate() {
            if i % 3 == 1 {
                assert_eq!(shot.theme, "go go go gone");
            }
        }
    }

    #[test]
    fn unique_lines_cycle_as_themes() {
        let shots = build_storyboard(60.0, "alpha\nbravo\ncharlie");
        assert!(find_chorus(&lyric_lines("alpha\nbravo\ncharlie")).is_none());
        assert_eq!(shots[0].theme, "alpha");
        assert_eq!(shots[1].theme, "bravo");
        assert_eq!(shots[2].theme, "charlie");
        assert_eq!(shots[3].theme, "alpha");
    }

    #[test]
    fn empty_lyrics_use_fallback_theme() {
        let shots = build_storyboard(60.0, "\n  \n");
        assert!(shots.iter().all(|s| s.theme == FALLBACK_THEME));
    }

    #[test]
    fn shot_ids_are_stable() {
        let shots = build_storyboard(10.0, "");
        assert_eq!(shots[0].id, "shot_01");
        assert_eq!(shots[11].id, "shot_12");
    }
}
