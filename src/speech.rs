/// Prefix some recognizers put in front of the transcription
pub const RECOGNIZED_PREFIX: &str = "You said: ";

/// Blocking voice capture.
///
/// Recognition failures are not errors: they come back as text meant to be
/// shown to the user in place of the question.
pub trait SpeechToText: Send + Sync {
    fn listen(&self) -> String;
}

/// Blocking speech synthesis
pub trait TextToSpeech: Send + Sync {
    fn speak(&self, text: &str) -> anyhow::Result<()>;
}

/// Drop the recognizer's "You said: " prefix, if present
pub fn strip_recognized_prefix(text: &str) -> &str {
    text.strip_prefix(RECOGNIZED_PREFIX).unwrap_or(text)
}

/// Engine for builds without audio support
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSpeech;

impl SpeechToText for UnavailableSpeech {
    fn listen(&self) -> String {
        "Speech recognition is not available".to_string()
    }
}

impl TextToSpeech for UnavailableSpeech {
    fn speak(&self, _text: &str) -> anyhow::Result<()> {
        anyhow::bail!("Speech synthesis is not available")
    }
}
