use quick_xml::events::{BytesText, Event};
use quick_xml::reader::Reader;
use thiserror::Error;

/// Deepest element nesting accepted before the document is rejected
const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("document has no <channel> element")]
    MissingChannel,

    #[error("XML nesting depth exceeds maximum of {0} levels")]
    TooDeep(usize),
}

/// An RSS 2.0 document as decoded from the wire, before any normalization.
///
/// Only the fields the ingestion pipeline consumes are kept; every other
/// element in the document is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeedDocument {
    pub channel: RawChannel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawChannel {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<RawItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Unparsed `<pubDate>` text; see [`crate::feed::parse_timestamp`].
    pub pub_date: String,
}

/// Which string an element's text belongs to.
#[derive(Clone, Copy)]
enum Field {
    ChannelTitle,
    ChannelLink,
    ChannelDescription,
    ItemTitle,
    ItemLink,
    ItemDescription,
    ItemPubDate,
}

/// Map an element path (root first) to a field.
///
/// Names are compared as full qualified names, so extension elements such as
/// `atom:link` or `media:title` never match `link` or `title`. Only direct
/// children of `channel` and `item` count; anything nested deeper is ignored.
fn field_for(path: &[Vec<u8>]) -> Option<Field> {
    match path {
        [_, channel, name] if channel.as_slice() == b"channel" => match name.as_slice() {
            b"title" => Some(Field::ChannelTitle),
            b"link" => Some(Field::ChannelLink),
            b"description" => Some(Field::ChannelDescription),
            _ => None,
        },
        [_, channel, item, name] if channel.as_slice() == b"channel" && item.as_slice() == b"item" => {
            match name.as_slice() {
                b"title" => Some(Field::ItemTitle),
                b"link" => Some(Field::ItemLink),
                b"description" => Some(Field::ItemDescription),
                b"pubDate" => Some(Field::ItemPubDate),
                _ => None,
            }
        }
        _ => None,
    }
}

fn is_channel(path: &[Vec<u8>]) -> bool {
    matches!(path, [_, channel] if channel.as_slice() == b"channel")
}

fn is_item(path: &[Vec<u8>]) -> bool {
    matches!(path, [_, channel, item] if channel.as_slice() == b"channel" && item.as_slice() == b"item")
}

/// Collects fields while the reader walks the document.
#[derive(Default)]
struct Builder {
    channel: Option<RawChannel>,
    item: Option<RawItem>,
}

impl Builder {
    fn slot(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::ChannelTitle => self.channel.as_mut().map(|c| &mut c.title),
            Field::ChannelLink => self.channel.as_mut().map(|c| &mut c.link),
            Field::ChannelDescription => self.channel.as_mut().map(|c| &mut c.description),
            Field::ItemTitle => self.item.as_mut().map(|i| &mut i.title),
            Field::ItemLink => self.item.as_mut().map(|i| &mut i.link),
            Field::ItemDescription => self.item.as_mut().map(|i| &mut i.description),
            Field::ItemPubDate => self.item.as_mut().map(|i| &mut i.pub_date),
        }
    }

    fn finish_item(&mut self) {
        if let (Some(item), Some(channel)) = (self.item.take(), self.channel.as_mut()) {
            channel.items.push(item);
        }
    }
}

/// Add text to whichever field the current element feeds, if any.
fn append(builder: &mut Builder, path: &[Vec<u8>], text: &str) {
    let Some(field) = field_for(path) else {
        return;
    };
    if let Some(slot) = builder.slot(field) {
        slot.push_str(text);
    }
}

fn text_of(e: &BytesText<'_>) -> String {
    // Unknown entities (e.g. `&nbsp;` in sloppy feeds) keep their raw text
    // instead of failing the whole document.
    match e.unescape() {
        Ok(text) => text.into_owned(),
        Err(_) => String::from_utf8_lossy(e).into_owned(),
    }
}

/// Decode an RSS payload. A document without a `<channel>` is rejected.
///
/// quick-xml (0.37) never expands `<!ENTITY>` declarations, so external
/// entity tricks have no effect.
pub fn parse_document(bytes: &[u8]) -> Result<RawFeedDocument, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut builder = Builder::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if path.len() >= MAX_DEPTH {
                    return Err(ParseError::TooDeep(MAX_DEPTH));
                }
                path.push(e.name().as_ref().to_vec());

                if is_channel(&path) && builder.channel.is_none() {
                    builder.channel = Some(RawChannel::default());
                } else if is_item(&path) {
                    builder.item = Some(RawItem::default());
                } else if let Some(field) = field_for(&path) {
                    // A repeated element replaces the earlier value.
                    if let Some(slot) = builder.slot(field) {
                        slot.clear();
                    }
                }
            }
            Event::Empty(e) => {
                path.push(e.name().as_ref().to_vec());
                if is_channel(&path) && builder.channel.is_none() {
                    builder.channel = Some(RawChannel::default());
                } else if is_item(&path) {
                    builder.item = Some(RawItem::default());
                    builder.finish_item();
                }
                path.pop();
            }
            Event::End(_) => {
                if is_item(&path) {
                    builder.finish_item();
                }
                path.pop();
            }
            Event::Text(e) => append(&mut builder, &path, &text_of(&e)),
            Event::CData(e) => append(&mut builder, &path, &String::from_utf8_lossy(&e)),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    builder
        .channel
        .map(|channel| RawFeedDocument { channel })
        .ok_or(ParseError::MissingChannel)
}
