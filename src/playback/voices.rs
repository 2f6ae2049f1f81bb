//! Voice discovery and ranking.

/// A voice the user can pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceOption {
    /// Display name.
    pub name: String,
    /// BCP-47-ish language tag, e.g. `en-US`.
    pub lang: String,
    /// Identifier handed back to the engine.
    pub id: String,
}

/// Vendor and voice names that usually sound best; listed first.
const PREFERRED_NAMES: [&str; 6] = ["Google", "Microsoft", "Samantha", "Daniel", "Karen", "Moira"];

/// Keep voices whose language starts with `lang_prefix`, move preferred
/// names to the front (otherwise keeping the input order) and cap the list
/// at `max`.
pub fn rank_voices(voices: Vec<VoiceOption>, lang_prefix: &str, max: usize) -> Vec<VoiceOption> {
    let (preferred, rest): (Vec<_>, Vec<_>) = voices
        .into_iter()
        .filter(|v| v.lang.starts_with(lang_prefix))
        .partition(|v| PREFERRED_NAMES.iter().any(|p| v.name.contains(p)));

    preferred.into_iter().chain(rest).take(max).collect()
}

/// Parse the table printed by `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  en-US           --/M      English_(America)  gmw/en-US            (en 10)
/// ```
///
/// The `File` column becomes the id; underscores in names become spaces.
/// Malformed lines are skipped.
pub fn parse_voice_table(table: &str) -> Vec<VoiceOption> {
    table
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("Pty"))
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            match cols.as_slice() {
                [_pty, lang, _age_gender, name, file, ..] => Some(VoiceOption {
                    name: name.replace('_', " "),
                    lang: (*lang).to_string(),
                    id: (*file).to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}
