//! Content shapes decoded from story responses
//!
//! A story response looks like `{"story": {"content": {"body": [...]}}}` where
//! each body entry is a block. Three projections are offered: the whole
//! document as untyped JSON, blocks indexed by their `id`, and the values of
//! translatable text blocks.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Component tag marking a block as translatable text
pub const TRANSLATABLE_TEXT_COMPONENT: &str = "_translatable_text";

/// Suffix appended to a text id for its editability marker entry
pub const EDITABLE_SUFFIX: &str = "_editable";

/// A fully decoded story response with every field preserved
pub type Document = Map<String, Value>;

/// A single content block as an untyped JSON object
pub type Block = Map<String, Value>;

/// Blocks keyed by their `id` field
pub type BlockIndex = HashMap<String, Block>;

/// Translatable text values keyed by block id, plus `<id>_editable` markers
pub type TranslatableTexts = HashMap<String, String>;

#[derive(Debug, Deserialize)]
struct StoryResponse<B> {
    story: Story<B>,
}

#[derive(Debug, Deserialize)]
struct Story<B> {
    content: Content<B>,
}

#[derive(Debug, Deserialize)]
struct Content<B> {
    #[serde(default = "Vec::new")]
    body: Vec<B>,
}

/// A body entry tagged as translatable text
#[derive(Debug, Deserialize)]
struct TranslatableText {
    #[serde(default)]
    id: String,
    #[serde(default)]
    value: String,
    /// Editor marker; only present in draft responses
    #[serde(default, rename = "_editable")]
    editable: String,
}

/// Decodes a response into an untyped document
pub fn decode_document(json: &[u8]) -> Result<Document, serde_json::Error> {
    serde_json::from_slice(json)
}

/// Indexes the body blocks of a story by their `id`
///
/// Blocks without a non-empty string `id` are skipped. A response without
/// `story.content` is a decode error; a content without `body` yields an
/// empty index.
pub fn decode_block_index(json: &[u8]) -> Result<BlockIndex, serde_json::Error> {
    let response: StoryResponse<Block> = serde_json::from_slice(json)?;

    let mut index = BlockIndex::new();
    for block in response.story.content.body {
        let id = match block.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => continue,
        };
        index.insert(id, block);
    }
    Ok(index)
}

/// Collects translatable text values from the body blocks of a story
///
/// Each `_translatable_text` block contributes `id -> value` and
/// `id_editable -> _editable`. Missing fields default to empty strings and
/// text blocks with an empty `id` are skipped, as are blocks of any other
/// component, whose fields may have any shape.
pub fn decode_translatable_texts(json: &[u8]) -> Result<TranslatableTexts, serde_json::Error> {
    let response: StoryResponse<Value> = serde_json::from_slice(json)?;

    let mut texts = TranslatableTexts::new();
    for block in response.story.content.body {
        if block.get("component").and_then(Value::as_str) != Some(TRANSLATABLE_TEXT_COMPONENT) {
            continue;
        }
        let text: TranslatableText = serde_json::from_value(block)?;
        if text.id.is_empty() {
            continue;
        }
        texts.insert(format!("{}{}", text.id, EDITABLE_SUFFIX), text.editable);
        texts.insert(text.id, text.value);
    }
    Ok(texts)
}
