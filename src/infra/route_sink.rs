use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use time::{OffsetDateTime, format_description};
use tracing::{info, warn};

use crate::infra::SegmentId;

/// Receives the full route of every successful episode.
pub trait RouteSink {
    fn on_optimal_route_found(&mut self, route: &[SegmentId]);
}

/// Collects found routes behind a shared handle so the training loop can
/// drain them while the environment owns the sink.
#[derive(Debug, Clone, Default)]
pub struct RouteCollector {
    routes: Arc<Mutex<Vec<Vec<SegmentId>>>>,
}

impl RouteCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all routes collected since the last call.
    pub fn take_routes(&self) -> Vec<Vec<SegmentId>> {
        match self.routes.lock() {
            Ok(mut routes) => std::mem::take(&mut *routes),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.routes.lock().map(|routes| routes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RouteSink for RouteCollector {
    fn on_optimal_route_found(&mut self, route: &[SegmentId]) {
        match self.routes.lock() {
            Ok(mut routes) => routes.push(route.to_vec()),
            Err(poisoned) => poisoned.into_inner().push(route.to_vec()),
        }
    }
}

/// Appends every found route as one line of space-separated segment ids.
pub struct RouteLogFile {
    file: File,
    routes_written: usize,
}

impl RouteLogFile {
    pub fn new(routes_folder: &str) -> io::Result<Self> {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let format = format_description::parse("[year][month][day]-[hour][minute][second]")
            .map_err(io::Error::other)?;
        let date_time_str = now.format(&format).map_err(io::Error::other)?;

        let filename = Path::new(routes_folder).join(format!("routes - {}.txt", date_time_str));
        if let Some(parent) = filename.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        info!("Logging found routes to {}", filename.display());
        Ok(Self {
            file: File::create(filename)?,
            routes_written: 0,
        })
    }

    fn write_route(&mut self, route: &[SegmentId]) -> io::Result<()> {
        writeln!(self.file, "{}", route.join(" "))?;
        self.file.flush()?;
        self.routes_written += 1;
        Ok(())
    }
}

impl RouteSink for RouteLogFile {
    fn on_optimal_route_found(&mut self, route: &[SegmentId]) {
        if let Err(e) = self.write_route(route) {
            warn!("Failed to log route #{}: {}", self.routes_written + 1, e);
        }
    }
}

pub struct CompositeSink {
    sinks: Vec<Box<dyn RouteSink>>,
}

impl CompositeSink {
    pub fn new(sinks: Vec<Box<dyn RouteSink>>) -> Self {
        Self { sinks }
    }
}

impl RouteSink for CompositeSink {
    fn on_optimal_route_found(&mut self, route: &[SegmentId]) {
        for sink in &mut self.sinks {
            sink.on_optimal_route_found(route);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(ids: &[&str]) -> Vec<SegmentId> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_collector_handles_share_routes() {
        let collector = RouteCollector::new();
        let mut sink = collector.clone();

        sink.on_optimal_route_found(&route(&["E4", "A", "E1"]));
        sink.on_optimal_route_found(&route(&["E4", "B", "E1"]));

        assert_eq!(collector.len(), 2);
        let routes = collector.take_routes();
        assert_eq!(routes[1], route(&["E4", "B", "E1"]));
        assert!(collector.is_empty());
    }

    #[test]
    fn test_composite_fans_out() {
        let first = RouteCollector::new();
        let second = RouteCollector::new();
        let mut composite = CompositeSink::new(vec![Box::new(first.clone()), Box::new(second.clone())]);

        composite.on_optimal_route_found(&route(&["E4", "E1"]));

        assert_eq!(first.take_routes(), vec![route(&["E4", "E1"])]);
        assert_eq!(second.take_routes(), vec![route(&["E4", "E1"])]);
    }

    #[test]
    fn test_route_log_file_writes_lines() {
        let folder = std::env::temp_dir().join(format!("route-log-{}", std::process::id()));
        let mut log = RouteLogFile::new(folder.to_str().unwrap()).unwrap();

        log.on_optimal_route_found(&route(&["E4", "A", "48563882#0"]));

        let entry = std::fs::read_dir(&folder).unwrap().next().unwrap().unwrap();
        let contents = std::fs::read_to_string(entry.path()).unwrap();
        assert_eq!(contents, "E4 A 48563882#0\n");
        std::fs::remove_dir_all(&folder).ok();
    }
}
