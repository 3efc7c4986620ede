//! XML and YAML conversion of prompt files.
//!
//! XML elements map onto YAML mappings: attributes become `@name` keys,
//! text next to attributes or children becomes `#text`, repeated children
//! become sequences and empty elements become null. The reverse direction
//! reads the same layout back.

use crate::error::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const TEXT_KEY: &str = "#text";
const ATTRIBUTE_PREFIX: char = '@';

/// Conversion direction for [`convert_directory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `.xml` files to `.yaml`
    XmlToYaml,
    /// `.yaml`/`.yml` files to `.xml`
    YamlToXml,
}

impl Direction {
    /// Picks the direction from a file extension.
    #[must_use]
    pub fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xml" => Some(Self::XmlToYaml),
            "yaml" | "yml" => Some(Self::YamlToXml),
            _ => None,
        }
    }

    fn accepts(self, path: &Path) -> bool {
        Self::for_path(path) == Some(self)
    }
}

/// Converts an XML file to `<stem>.yaml` next to it.
///
/// Content with several top-level elements (or stray top-level text) is
/// retried wrapped in a `<root>` element.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read or written, and
/// [`Error::Conversion`] if the XML cannot be parsed even after wrapping.
pub fn xml_to_yaml(path: &Path) -> Result<PathBuf> {
    let xml = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

    let tree = match parse_xml(&xml) {
        Ok(tree) => tree,
        Err(first) => {
            warn!("XML parsing error in {}: {}", path.display(), first);
            debug!("Retrying {} wrapped in a root element", path.display());
            let wrapped = format!("<root>\n{xml}\n</root>");
            let tree = parse_xml(&wrapped).map_err(|second| {
                Error::conversion(path, format!("{first}; with <root> wrapper: {second}"))
            })?;
            info!("Parsed {} after adding a root element", path.display());
            tree
        }
    };

    let yaml = serde_yaml::to_string(&tree).map_err(|e| Error::conversion(path, e.to_string()))?;

    let output = path.with_extension("yaml");
    fs::write(&output, yaml).map_err(|e| Error::io(&output, e))?;
    Ok(output)
}

/// Converts a YAML file to `<stem>.xml` next to it.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read or written, and
/// [`Error::Conversion`] if the YAML is invalid or is not a mapping with a
/// single root key.
pub fn yaml_to_xml(path: &Path) -> Result<PathBuf> {
    let yaml = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let xml = render_xml(&yaml).map_err(|message| Error::conversion(path, message))?;

    let output = path.with_extension("xml");
    fs::write(&output, xml).map_err(|e| Error::io(&output, e))?;
    Ok(output)
}

/// Converts one file, choosing the direction from its extension.
///
/// # Errors
///
/// Returns [`Error::Conversion`] for an unsupported extension, otherwise
/// whatever the chosen conversion returns.
pub fn convert_file(path: &Path) -> Result<PathBuf> {
    match Direction::for_path(path) {
        Some(Direction::XmlToYaml) => xml_to_yaml(path),
        Some(Direction::YamlToXml) => yaml_to_xml(path),
        None => Err(Error::conversion(
            path,
            "unsupported extension, expected .xml, .yaml or .yml",
        )),
    }
}

/// Converts every matching file directly inside `dir`.
///
/// Subdirectories are not entered. A file that fails to convert is logged
/// and skipped.
///
/// # Errors
///
/// Returns [`Error::Io`] if `dir` is not a readable directory.
pub fn convert_directory(dir: &Path, direction: Direction) -> Result<Vec<(PathBuf, PathBuf)>> {
    if !dir.is_dir() {
        return Err(Error::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut inputs: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| direction.accepts(path))
        .collect();
    inputs.sort();

    let mut converted = Vec::with_capacity(inputs.len());
    for input in inputs {
        let result = match direction {
            Direction::XmlToYaml => xml_to_yaml(&input),
            Direction::YamlToXml => yaml_to_xml(&input),
        };

        match result {
            Ok(output) => {
                info!("Converted {} to {}", input.display(), output.display());
                converted.push((input, output));
            }
            Err(e) => warn!("Skipping {}: {}", input.display(), e),
        }
    }

    Ok(converted)
}

struct Frame {
    name: String,
    children: Mapping,
    text: Vec<String>,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> std::result::Result<Self, String> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut children = Mapping::new();

        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attr.key.as_ref());
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            children.insert(
                Value::String(format!("{ATTRIBUTE_PREFIX}{key}")),
                Value::String(value.into_owned()),
            );
        }

        Ok(Self {
            name,
            children,
            text: Vec::new(),
        })
    }

    fn close(self) -> (String, Value) {
        let text = self.text.join(" ");
        let text = text.trim();
        let value = if self.children.is_empty() {
            if text.is_empty() {
                Value::Null
            } else {
                Value::String(text.to_string())
            }
        } else {
            let mut children = self.children;
            if !text.is_empty() {
                children.insert(Value::String(TEXT_KEY.to_string()), Value::String(text.to_string()));
            }
            Value::Mapping(children)
        };
        (self.name, value)
    }
}

/// Adds a child, turning repeated names into a sequence.
fn insert_child(children: &mut Mapping, name: String, value: Value) {
    let key = Value::String(name);
    match children.get_mut(&key) {
        Some(Value::Sequence(items)) => items.push(value),
        Some(existing) => {
            let first = std::mem::replace(existing, Value::Null);
            *existing = Value::Sequence(vec![first, value]);
        }
        None => {
            children.insert(key, value);
        }
    }
}

fn parse_xml(xml: &str) -> std::result::Result<Value, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    let mut finish = |stack: &mut Vec<Frame>, frame: Frame| -> std::result::Result<(), String> {
        let (name, value) = frame.close();
        match stack.last_mut() {
            Some(parent) => {
                insert_child(&mut parent.children, name, value);
                Ok(())
            }
            None if root.is_some() => Err(format!("second top-level element <{name}>")),
            None => {
                root = Some((name, value));
                Ok(())
            }
        }
    };

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("at byte {}: {e}", reader.buffer_position()))?;

        match event {
            Event::Start(start) => stack.push(Frame::open(&start)?),
            Event::Empty(start) => {
                let frame = Frame::open(&start)?;
                finish(&mut stack, frame)?;
            }
            Event::End(_) => {
                let frame = stack.pop().ok_or("unexpected closing tag")?;
                finish(&mut stack, frame)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| e.to_string())?;
                match stack.last_mut() {
                    Some(frame) => frame.text.push(text.into_owned()),
                    None if text.trim().is_empty() => {}
                    None => return Err("text outside of the root element".to_string()),
                }
            }
            Event::CData(data) => {
                let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                match stack.last_mut() {
                    Some(frame) => frame.text.push(data),
                    None => return Err("CDATA outside of the root element".to_string()),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}>", open.name));
    }

    let (name, value) = root.ok_or("no root element")?;
    let mut document = Mapping::new();
    document.insert(Value::String(name), value);
    Ok(Value::Mapping(document))
}

fn render_xml(yaml: &str) -> std::result::Result<String, String> {
    let document: Value = serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;

    let Value::Mapping(top) = document else {
        return Err("document must be a mapping with a single root key".to_string());
    };
    if top.len() != 1 {
        return Err(format!(
            "document must have exactly one root key, found {}",
            top.len()
        ));
    }

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(|e| e.to_string())?;

    for (key, value) in &top {
        let name = key_text(key).ok_or("root key must be a scalar")?;
        write_element(&mut writer, &name, value)?;
    }

    let mut xml = String::from_utf8(writer.into_inner()).map_err(|e| e.to_string())?;
    xml.push('\n');
    Ok(xml)
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
) -> std::result::Result<(), String> {
    match value {
        Value::Sequence(items) => {
            for item in items {
                write_element(writer, name, item)?;
            }
            Ok(())
        }
        Value::Mapping(children) => {
            let mut start = BytesStart::new(name);
            let mut text = None;
            let mut nested = Vec::new();

            for (key, child) in children {
                let key = key_text(key).ok_or_else(|| format!("non-scalar key under <{name}>"))?;
                if let Some(attribute) = key.strip_prefix(ATTRIBUTE_PREFIX) {
                    let attr_value = scalar_text(child).unwrap_or_default();
                    start.push_attribute((attribute, attr_value.as_str()));
                } else if key == TEXT_KEY {
                    text = scalar_text(child);
                } else {
                    nested.push((key, child));
                }
            }

            if text.is_none() && nested.is_empty() {
                return emit(writer, Event::Empty(start));
            }

            emit(writer, Event::Start(start))?;
            if let Some(text) = text {
                emit(writer, Event::Text(BytesText::new(&text)))?;
            }
            for (key, child) in nested {
                write_element(writer, &key, child)?;
            }
            emit(writer, Event::End(BytesEnd::new(name)))
        }
        Value::Null => emit(writer, Event::Empty(BytesStart::new(name))),
        Value::Tagged(tagged) => write_element(writer, name, &tagged.value),
        scalar => {
            let text = scalar_text(scalar).unwrap_or_default();
            emit(writer, Event::Start(BytesStart::new(name)))?;
            emit(writer, Event::Text(BytesText::new(&text)))?;
            emit(writer, Event::End(BytesEnd::new(name)))
        }
    }
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> std::result::Result<(), String> {
    writer.write_event(event).map_err(|e| e.to_string())
}

fn key_text(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    const PROMPT_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<prompt version="2">
  <system>You are a test analyst.</system>
  <example lang="python">def test_a(): pass</example>
  <example lang="python">def test_b(): pass</example>
  <empty/>
</prompt>
"#;

    fn get<'a>(value: &'a Value, path: &[&str]) -> &'a Value {
        path.iter().fold(value, |v, key| &v[*key])
    }

    #[test]
    fn test_parse_structure() {
        let tree = parse_xml(PROMPT_XML).unwrap();

        assert_eq!(get(&tree, &["prompt", "@version"]).as_str(), Some("2"));
        assert_eq!(
            get(&tree, &["prompt", "system"]).as_str(),
            Some("You are a test analyst.")
        );
        assert!(get(&tree, &["prompt", "empty"]).is_null());

        let examples = get(&tree, &["prompt", "example"]).as_sequence().unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[1]["@lang"].as_str(), Some("python"));
        assert_eq!(examples[1]["#text"].as_str(), Some("def test_b(): pass"));
    }

    #[test]
    fn test_parse_keeps_document_order() {
        let tree = parse_xml("<a><z>1</z><b>2</b><m>3</m></a>").unwrap();
        let keys: Vec<_> = tree["a"]
            .as_mapping()
            .unwrap()
            .keys()
            .filter_map(Value::as_str)
            .collect();

        assert_eq!(keys, vec!["z", "b", "m"]);
    }

    #[test]
    fn test_parse_unescapes_entities() {
        let tree = parse_xml("<a>x &lt; y &amp;&amp; y &gt; z</a>").unwrap();
        assert_eq!(tree["a"].as_str(), Some("x < y && y > z"));
    }

    #[test]
    fn test_parse_mixed_content_keeps_separators() {
        let tree = parse_xml("<p>hello <b>x</b> world</p>").unwrap();

        assert_eq!(tree["p"]["b"].as_str(), Some("x"));
        assert_eq!(tree["p"]["#text"].as_str(), Some("hello world"));
    }

    #[test]
    fn test_parse_rejects_multiple_roots() {
        assert!(parse_xml("<a/><b/>").is_err());
        assert!(parse_xml("<a>").is_err());
        assert!(parse_xml("").is_err());
    }

    #[test]
    fn test_render_xml() {
        let yaml = "prompt:\n  '@version': '2'\n  system: Analyze\n  example:\n    - one\n    - two\n  empty: null\n";
        let xml = render_xml(yaml).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<prompt version=\"2\">"));
        assert!(xml.contains("<system>Analyze</system>"));
        assert_eq!(xml.matches("<example>").count(), 2);
        assert!(xml.contains("<empty/>"));
    }

    #[test]
    fn test_render_xml_escapes_text() {
        let xml = render_xml("a: 'x < y'").unwrap();
        assert!(xml.contains("<a>x &lt; y</a>"));
    }

    #[test]
    fn test_render_requires_single_root() {
        assert!(render_xml("a: 1\nb: 2\n").is_err());
        assert!(render_xml("- a\n- b\n").is_err());
    }

    #[test]
    fn test_round_trip_through_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        let xml_file = temp.child("prompt.xml");
        xml_file.write_str(PROMPT_XML).unwrap();

        let yaml_path = xml_to_yaml(xml_file.path()).unwrap();
        assert_eq!(yaml_path, temp.path().join("prompt.yaml"));

        fs::remove_file(xml_file.path()).unwrap();
        let xml_path = yaml_to_xml(&yaml_path).unwrap();
        assert_eq!(xml_path, xml_file.path());

        let original = parse_xml(PROMPT_XML).unwrap();
        let restored = parse_xml(&fs::read_to_string(&xml_path).unwrap()).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_fragment_is_wrapped_in_root() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("fragment.xml");
        file.write_str("<system>Analyze</system>\n<user>Go</user>\n").unwrap();

        let output = xml_to_yaml(file.path()).unwrap();
        let tree: Value = serde_yaml::from_str(&fs::read_to_string(output).unwrap()).unwrap();

        assert_eq!(tree["root"]["system"].as_str(), Some("Analyze"));
        assert_eq!(tree["root"]["user"].as_str(), Some("Go"));
    }

    #[test]
    fn test_broken_xml_fails() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("broken.xml");
        file.write_str("<a><b></a>").unwrap();

        let err = xml_to_yaml(file.path()).unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
        assert!(!temp.child("broken.yaml").exists());
    }

    #[test]
    fn test_convert_file_unsupported_extension() {
        let err = convert_file(Path::new("notes.txt")).unwrap_err();
        assert!(err.to_string().contains("unsupported extension"));
    }

    #[test]
    fn test_convert_file_yml() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("prompt.yml");
        file.write_str("prompt:\n  system: Analyze\n").unwrap();

        let output = convert_file(file.path()).unwrap();
        assert_eq!(output, temp.path().join("prompt.xml"));
    }

    #[test]
    fn test_convert_directory_top_level_only() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.xml").write_str("<a>1</a>").unwrap();
        temp.child("b.xml").write_str("<b><c></b>").unwrap();
        temp.child("c.yaml").write_str("c: 1").unwrap();
        temp.child("nested/d.xml").write_str("<d/>").unwrap();

        let converted = convert_directory(temp.path(), Direction::XmlToYaml).unwrap();

        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].0, temp.path().join("a.xml"));
        assert!(temp.child("a.yaml").exists());
        assert!(!temp.child("nested/d.yaml").exists());
    }

    #[test]
    fn test_convert_directory_missing() {
        let err = convert_directory(Path::new("/definitely/not/here"), Direction::YamlToXml)
            .unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_direction_for_path() {
        assert_eq!(Direction::for_path(Path::new("a.XML")), Some(Direction::XmlToYaml));
        assert_eq!(Direction::for_path(Path::new("a.yml")), Some(Direction::YamlToXml));
        assert_eq!(Direction::for_path(Path::new("a")), None);
    }
}
