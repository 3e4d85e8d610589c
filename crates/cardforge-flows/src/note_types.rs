//! Note type definitions the flows write into.

use cardforge_core::config::{AnkiConfig, ListeningConfig};
use cardforge_core::types::NoteTypeSpec;

use crate::listening::steps::LISTENING_FIELDS;
use crate::vocab::steps::VOCAB_FIELDS;

pub fn vocab_note_type(config: &AnkiConfig) -> NoteTypeSpec {
    NoteTypeSpec {
        name: config.model_name.clone(),
        fields: VOCAB_FIELDS.iter().map(|f| f.to_string()).collect(),
        css: config.card_css.clone(),
        template_name: "Vocabulary Card".to_string(),
        front: config.card_front.clone(),
        back: config.card_back.clone(),
    }
}

pub fn listening_note_type(config: &ListeningConfig) -> NoteTypeSpec {
    NoteTypeSpec {
        name: config.model_name.clone(),
        fields: LISTENING_FIELDS.iter().map(|f| f.to_string()).collect(),
        css: config.card_css.clone(),
        template_name: "Listening Card".to_string(),
        front: "{{Audio}}".to_string(),
        back: "{{FrontSide}}\n<hr id=answer>\n<div class=\"korean\">{{Korean}}</div>\n<div class=\"chinese\">{{Chinese}}</div>"
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_reference_every_field() {
        let vocab = vocab_note_type(&AnkiConfig::default());
        let listening = listening_note_type(&ListeningConfig::default());
        for spec in [&vocab, &listening] {
            let templates = format!("{}{}", spec.front, spec.back);
            for field in &spec.fields {
                assert!(
                    templates.contains(&format!("{{{{{}}}}}", field)),
                    "{} template misses {}",
                    spec.name,
                    field
                );
            }
        }
        assert_eq!(vocab.fields[0], "Word");
        assert_eq!(listening.name, "Listening");
    }
}
