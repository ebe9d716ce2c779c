//! Per-group viewer registry.
//!
//! A group is a named partition of viewer state: every image addressed to
//! the same group shares one viewer instance. Groups are created lazily by
//! the first `Image` message naming them and destroyed once their viewer
//! reports user-driven exit. The registry is owned exclusively by the
//! dispatcher's single cooperative loop, so no locking is involved.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Instant;

use pixlog_core::ImageMessage;
use tracing::{debug, info};

use crate::viewer::{Viewer, ViewerError, ViewerFactory};

/// One named viewer group.
pub struct ViewerGroup {
    viewer: Box<dyn Viewer>,
    last_touched: Instant,
}

impl ViewerGroup {
    /// When the group last received a message.
    pub fn last_touched(&self) -> Instant {
        self.last_touched
    }
}

/// All live viewer groups plus the factory that creates new ones.
pub struct ViewerGroupRegistry {
    groups: HashMap<String, ViewerGroup>,
    factory: Box<dyn ViewerFactory>,
    ever_created: bool,
}

impl ViewerGroupRegistry {
    pub fn new(factory: Box<dyn ViewerFactory>) -> Self {
        Self {
            groups: HashMap::new(),
            factory,
            ever_created: false,
        }
    }

    /// Number of live groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether any group was ever created over the registry's lifetime.
    /// Feeds the stop-on-empty condition: a server that never displayed
    /// anything does not stop just because nothing is open.
    pub fn ever_created(&self) -> bool {
        self.ever_created
    }

    pub fn contains(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Routes an image to its group's viewer, creating the group first if
    /// this is the first message naming it.
    pub fn add_image(&mut self, image: &ImageMessage) -> Result<(), ViewerError> {
        let group = match self.groups.entry(image.group.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                info!("creating viewer group '{}'", image.group);
                self.ever_created = true;
                entry.insert(ViewerGroup {
                    viewer: self.factory.create(&image.group),
                    last_touched: Instant::now(),
                })
            }
        };
        group.last_touched = Instant::now();
        group.viewer.add_image(image)
    }

    /// Advances every viewer by one frame and removes groups whose viewer
    /// reported exit. Returns the number of groups removed.
    pub fn advance_all(&mut self, dt: f32) -> usize {
        let mut exited = Vec::new();
        for (name, group) in self.groups.iter_mut() {
            group.viewer.render_frame(dt);
            if group.viewer.exit_requested() {
                exited.push(name.clone());
            }
        }
        for name in &exited {
            debug!("viewer group '{name}' closed by user");
            self.groups.remove(name);
        }
        exited.len()
    }
}
