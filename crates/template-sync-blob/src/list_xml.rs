use quick_xml::Reader;
use quick_xml::events::Event;

use template_sync::provider::ProviderError;

/// One page of a List Blobs response.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    pub blobs: Vec<BlobEntry>,
    /// Virtual directory prefixes, exactly as the service returns them
    /// (trailing delimiter included).
    pub prefixes: Vec<String>,
    pub next_marker: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct BlobEntry {
    pub name: String,
    pub size: Option<u64>,
}

/// Parse the XML body of
/// `GET {container}?restype=container&comp=list&delimiter=/`.
pub fn parse_list_page(xml: &str) -> Result<ListPage, ProviderError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = ListPage::default();
    let mut stack: Vec<String> = Vec::new();
    let mut current_name: Option<String> = None;
    let mut current_size: Option<u64> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(event)) => {
                stack.push(String::from_utf8_lossy(event.name().as_ref()).into_owned());
            }
            Ok(Event::End(event)) => {
                match event.name().as_ref() {
                    b"Blob" => {
                        if let Some(name) = current_name.take() {
                            page.blobs.push(BlobEntry {
                                name,
                                size: current_size.take(),
                            });
                        }
                        current_size = None;
                    }
                    b"BlobPrefix" => {
                        if let Some(prefix) = current_name.take() {
                            page.prefixes.push(prefix);
                        }
                    }
                    _ => {}
                }
                stack.pop();
            }
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|e| ProviderError::Parse(e.to_string()))?;

                if ends_with(&stack, &["Blob", "Name"])
                    || ends_with(&stack, &["BlobPrefix", "Name"])
                {
                    current_name = Some(value.into_owned());
                } else if ends_with(&stack, &["Blob", "Properties", "Content-Length"]) {
                    current_size = value.parse().ok();
                } else if ends_with(&stack, &["NextMarker"]) && !value.is_empty() {
                    page.next_marker = Some(value.into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ProviderError::Parse(e.to_string())),
            _ => {}
        }
    }

    Ok(page)
}

fn ends_with(stack: &[String], suffix: &[&str]) -> bool {
    stack.len() >= suffix.len()
        && stack
            .iter()
            .rev()
            .zip(suffix.iter().rev())
            .all(|(a, b)| a == b)
}
