use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The closed set of item types a `Content` row may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Text,
    Video,
    Image,
    File,
}

impl ItemKind {
    pub const ALL: [ItemKind; 4] = [Self::Text, Self::Video, Self::Image, Self::File];

    /// Table holding items of this kind.
    pub fn table(self) -> &'static str {
        match self {
            Self::Text => "text_items",
            Self::Video => "video_items",
            Self::Image => "image_items",
            Self::File => "file_items",
        }
    }

    /// Column holding the kind-specific payload.
    pub fn payload_column(self) -> &'static str {
        match self {
            Self::Text => "body",
            Self::Video => "url",
            Self::Image => "image",
            Self::File => "file",
        }
    }

    /// Kinds whose payload is an uploaded blob.
    pub fn is_upload(self) -> bool {
        matches!(self, Self::Image | Self::File)
    }

    /// Media subdirectory for uploaded payloads.
    pub fn upload_dir(self) -> Option<&'static str> {
        match self {
            Self::Image => Some("images"),
            Self::File => Some("files"),
            _ => None,
        }
    }
}

impl FromStr for ItemKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "video" => Ok(Self::Video),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Video => write!(f, "video"),
            Self::Image => write!(f, "image"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Kind-specific payload of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ItemBody {
    Text { content: String },
    Video { url: String },
    Image { image: String },
    File { file: String },
}

impl ItemBody {
    pub fn new(kind: ItemKind, payload: String) -> Self {
        match kind {
            ItemKind::Text => Self::Text { content: payload },
            ItemKind::Video => Self::Video { url: payload },
            ItemKind::Image => Self::Image { image: payload },
            ItemKind::File => Self::File { file: payload },
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Text { .. } => ItemKind::Text,
            Self::Video { .. } => ItemKind::Video,
            Self::Image { .. } => ItemKind::Image,
            Self::File { .. } => ItemKind::File,
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Self::Text { content } => content,
            Self::Video { url } => url,
            Self::Image { image } => image,
            Self::File { file } => file,
        }
    }

    /// Relative media path of an uploaded payload.
    pub fn blob_path(&self) -> Option<&str> {
        match self {
            Self::Image { image } => Some(image),
            Self::File { file } => Some(file),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub creator_id: i64,
    pub title: String,
    #[serde(flatten)]
    pub body: ItemBody,
    pub created: String,
    pub updated: String,
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        self.body.kind()
    }
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub title: String,
    pub body: ItemBody,
}

/// Edit of an existing item. A `None` payload keeps the stored one, which is
/// how an image or file item is retitled without re-uploading.
#[derive(Debug, Clone)]
pub struct ItemUpdate {
    pub title: String,
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Content {
    pub id: i64,
    pub module_id: i64,
    pub item_kind: ItemKind,
    pub item_id: i64,
    pub order: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentWithItem {
    #[serde(flatten)]
    pub content: Content,
    pub item: Item,
}
