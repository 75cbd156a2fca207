//! Theme-specific file naming: quiz body paths and audio paths.

/// Static per-theme naming data.
struct ThemeAssets {
    id: i64,
    /// Prefix of quiz files, e.g. `colors_quiz_101.json`
    key: &'static str,
    /// Folder under `audio/`
    audio_folder: &'static str,
}

const THEME_ASSETS: &[ThemeAssets] = &[
    ThemeAssets { id: 1, key: "colors", audio_folder: "Colors" },
    ThemeAssets { id: 2, key: "numbers", audio_folder: "Numbers" },
    ThemeAssets { id: 3, key: "animals", audio_folder: "Animals" },
    ThemeAssets { id: 4, key: "food", audio_folder: "Food" },
    ThemeAssets { id: 5, key: "family", audio_folder: "Family" },
    ThemeAssets { id: 6, key: "body", audio_folder: "Body" },
];

fn theme_assets(theme_id: i64) -> Option<&'static ThemeAssets> {
    THEME_ASSETS.iter().find(|t| t.id == theme_id)
}

pub fn theme_key(theme_id: i64) -> Option<&'static str> {
    theme_assets(theme_id).map(|t| t.key)
}

/// Path of a quiz body relative to the data directory.
pub fn quiz_path(theme_id: i64, quiz_id: i64) -> Option<String> {
    theme_key(theme_id).map(|key| format!("themes/theme-{}/{}_quiz_{}.json", theme_id, key, quiz_id))
}

/// Path of an audio file, or `None` for themes without audio.
pub fn get_audio_path(theme_id: i64, filename: &str) -> Option<String> {
    let folder = theme_assets(theme_id)?.audio_folder;
    if filename.ends_with(".mp3") {
        Some(format!("./audio/{}/{}", folder, filename))
    } else {
        Some(format!("./audio/{}/{}.mp3", folder, filename))
    }
}

/// Audio set recorded for a quiz, keyed by the last digit of its id.
fn audio_set(quiz_id: i64) -> Option<&'static str> {
    match quiz_id.rem_euclid(10) {
        1 => Some("words"),
        2 => Some("phrases"),
        3 => Some("sentences"),
        _ => None,
    }
}

/// Expected audio filename (without extension) of the question at
/// zero-based `position`.
pub fn question_audio_filename(theme_id: i64, quiz_id: i64, position: usize) -> Option<String> {
    let key = theme_key(theme_id)?;
    let set = audio_set(quiz_id)?;
    Some(format!("{}_{}_{:02}", key, set, position + 1))
}
