use serde::{Deserialize, Serialize};

pub const MAX_BUTTONS: usize = 3;
pub const MAX_LIST_ROWS: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    Link { url: String },
    MediaId { id: String },
}

/// Channel-neutral message the dialogue wants delivered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text { body: String },
    Buttons { body: String, choices: Vec<Choice> },
    List { body: String, button: String, rows: Vec<ListRow> },
    Image { source: MediaSource, caption: Option<String> },
    Document { source: MediaSource, filename: String, caption: Option<String> },
}

impl OutboundMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    /// Extra choices past `MAX_BUTTONS` are dropped.
    pub fn buttons<F>(body: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ButtonsBuilder),
    {
        let mut builder = ButtonsBuilder::default();
        build(&mut builder);
        let mut choices = builder.choices;
        choices.truncate(MAX_BUTTONS);
        Self::Buttons { body: body.into(), choices }
    }

    /// Extra rows past `MAX_LIST_ROWS` are dropped.
    pub fn list<F>(body: impl Into<String>, button: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ListBuilder),
    {
        let mut builder = ListBuilder::default();
        build(&mut builder);
        let mut rows = builder.rows;
        rows.truncate(MAX_LIST_ROWS);
        Self::List { body: body.into(), button: button.into(), rows }
    }

    pub fn image_link(url: impl Into<String>, caption: Option<String>) -> Self {
        Self::Image { source: MediaSource::Link { url: url.into() }, caption }
    }

    /// The line written to the conversation log for this message.
    pub fn transcript(&self) -> String {
        match self {
            Self::Text { body } | Self::Buttons { body, .. } | Self::List { body, .. } => {
                body.clone()
            }
            Self::Image { caption, .. } => {
                caption.clone().map_or_else(|| "[imagen]".to_string(), |text| format!("[imagen] {text}"))
            }
            Self::Document { filename, .. } => format!("[documento] {filename}"),
        }
    }
}

#[derive(Default)]
pub struct ButtonsBuilder {
    choices: Vec<Choice>,
}

impl ButtonsBuilder {
    pub fn choice(&mut self, id: impl Into<String>, title: impl Into<String>) -> &mut Self {
        self.choices.push(Choice { id: id.into(), title: title.into() });
        self
    }
}

#[derive(Default)]
pub struct ListBuilder {
    rows: Vec<ListRow>,
}

impl ListBuilder {
    pub fn row(&mut self, id: impl Into<String>, title: impl Into<String>) -> &mut Self {
        self.rows.push(ListRow { id: id.into(), title: title.into(), description: None });
        self
    }

    pub fn row_with_description(
        &mut self,
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> &mut Self {
        self.rows.push(ListRow {
            id: id.into(),
            title: title.into(),
            description: Some(description.into()),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{OutboundMessage, MAX_BUTTONS, MAX_LIST_ROWS};

    #[test]
    fn builders_cap_choice_counts() {
        let buttons = OutboundMessage::buttons("¿Seguimos?", |builder| {
            for index in 0..5 {
                builder.choice(format!("B{index}"), format!("Opción {index}"));
            }
        });
        assert!(matches!(buttons, OutboundMessage::Buttons { ref choices, .. } if choices.len() == MAX_BUTTONS));

        let list = OutboundMessage::list("Elige", "Ver", |builder| {
            for index in 0..12 {
                builder.row(format!("R{index}"), format!("Fila {index}"));
            }
        });
        assert!(matches!(list, OutboundMessage::List { ref rows, .. } if rows.len() == MAX_LIST_ROWS));
    }

    #[test]
    fn serializes_with_type_tag() {
        let value = serde_json::to_value(OutboundMessage::text("hola")).expect("serialize text");
        assert_eq!(value["type"], "text");
        assert_eq!(value["body"], "hola");
    }
}
