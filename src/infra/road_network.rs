use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::info;

use crate::infra::{SegmentId, is_internal};

#[derive(Debug)]
pub enum NetworkError {
    Io(io::Error),
    Xml(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetworkError::Io(e) => write!(formatter, "Could not read network file: {}", e),
            NetworkError::Xml(message) => write!(formatter, "Malformed network file: {}", message),
        }
    }
}

impl Error for NetworkError {}

impl From<io::Error> for NetworkError {
    fn from(e: io::Error) -> Self {
        NetworkError::Io(e)
    }
}

/// Read-only query surface of the road network.
pub trait RoadGraph {
    /// Successors of a segment in a stable order. Empty for dead ends and
    /// unknown segments.
    fn outgoing_segments(&self, segment: &str) -> &[SegmentId];
}

/// Edge-level connectivity of a SUMO network.
#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    outgoing: HashMap<SegmentId, Vec<SegmentId>>,
}

impl RoadNetwork {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NetworkError> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)?;
        let network = Self::parse(&xml)?;
        info!(
            "Loaded road network {} ({} segments, {} dead ends)",
            path.display(),
            network.len(),
            network.dead_ends().len()
        );
        Ok(network)
    }

    /// Parse `<edge>` and `<connection>` elements of a `.net.xml` document.
    pub fn parse(xml: &str) -> Result<Self, NetworkError> {
        let mut reader = Reader::from_str(xml);
        let mut edges: Vec<SegmentId> = Vec::new();
        let mut connections: Vec<(SegmentId, SegmentId)> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                    match element.name().as_ref() {
                        b"edge" => {
                            let id = attribute(&element, b"id")?;
                            let function = attribute(&element, b"function")?;
                            if let Some(id) = id
                                && function.as_deref() != Some("internal")
                                && !is_internal(&id)
                            {
                                edges.push(id);
                            }
                        }
                        b"connection" => {
                            let from = attribute(&element, b"from")?;
                            let to = attribute(&element, b"to")?;
                            if let (Some(from), Some(to)) = (from, to) {
                                connections.push((from, to));
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(NetworkError::Xml(format!(
                        "at position {}: {}",
                        reader.error_position(),
                        e
                    )));
                }
                _ => {}
            }
        }

        let mut network = Self::default();
        for edge in edges {
            network.outgoing.entry(edge).or_default();
        }
        for (from, to) in connections {
            network.connect(from, to);
        }
        Ok(network)
    }

    pub fn from_connections<I, S>(connections: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<SegmentId>,
    {
        let mut network = Self::default();
        for (from, to) in connections {
            network.connect(from.into(), to.into());
        }
        network
    }

    fn connect(&mut self, from: SegmentId, to: SegmentId) {
        if is_internal(&from) || is_internal(&to) {
            return;
        }
        self.outgoing.entry(to.clone()).or_default();
        let successors = self.outgoing.entry(from).or_default();
        if !successors.contains(&to) {
            successors.push(to);
        }
    }

    pub fn contains(&self, segment: &str) -> bool {
        self.outgoing.contains_key(segment)
    }

    pub fn len(&self) -> usize {
        self.outgoing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty()
    }

    /// Segments without any successor.
    pub fn dead_ends(&self) -> HashSet<&str> {
        self.outgoing
            .iter()
            .filter(|(_, successors)| successors.is_empty())
            .map(|(segment, _)| segment.as_str())
            .collect()
    }
}

impl RoadGraph for RoadNetwork {
    fn outgoing_segments(&self, segment: &str) -> &[SegmentId] {
        self.outgoing
            .get(segment)
            .map(|successors| successors.as_slice())
            .unwrap_or(&[])
    }
}

fn attribute(element: &BytesStart, name: &[u8]) -> Result<Option<String>, NetworkError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| NetworkError::Xml(e.to_string()))?;
        if attr.key.as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|e| NetworkError::Xml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
