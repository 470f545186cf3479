//! Ports: typed, named endpoints on stages.
//!
//! A port carries an opaque media-type descriptor (a capability string in
//! the caps tradition) and a linked/unlinked flag protected by its own
//! lock, so resolving one link never blocks progress elsewhere.
//!
//! Static ports exist from stage creation; dynamic output ports appear
//! only once the owning stage has negotiated its internal format and
//! announces them at run time.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Direction of data flow through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// Opaque media-type descriptor.
///
/// Compatibility is string equality, with `*` matching anything. The
/// engine never interprets the contents beyond that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType(String);

impl MediaType {
    pub const WILDCARD: &'static str = "*";

    pub fn new(caps: impl Into<String>) -> Self {
        Self(caps.into())
    }

    /// The wildcard type, compatible with every other type.
    pub fn any() -> Self {
        Self(Self::WILDCARD.to_string())
    }

    pub fn is_any(&self) -> bool {
        self.0 == Self::WILDCARD
    }

    pub fn compatible(&self, other: &MediaType) -> bool {
        self.is_any() || other.is_any() || self.0 == other.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared shape of one port: name, direction, media type, whether a
/// link to it is required for activation, and whether it is static or
/// appears dynamically at run time.
#[derive(Debug, Clone)]
pub struct PortDescriptor {
    pub name: String,
    pub direction: PortDirection,
    pub media_type: MediaType,
    pub required: bool,
    pub dynamic: bool,
}

impl PortDescriptor {
    /// A required static input port.
    pub fn input(name: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
            media_type,
            required: true,
            dynamic: false,
        }
    }

    /// A required static output port.
    pub fn output(name: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
            media_type,
            required: true,
            dynamic: false,
        }
    }

    /// An output port that does not exist until the owning stage
    /// announces it at run time.
    pub fn dynamic_output(name: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
            media_type,
            required: false,
            dynamic: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// A live port instance owned by a stage.
///
/// The linked flag is the only state mutated from more than one component
/// (link setup vs. port resolution) and has its own lock, scoped to this
/// single port.
#[derive(Debug)]
pub struct Port {
    descriptor: PortDescriptor,
    linked: Mutex<bool>,
}

impl Port {
    pub fn new(descriptor: PortDescriptor) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            linked: Mutex::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn direction(&self) -> PortDirection {
        self.descriptor.direction
    }

    pub fn media_type(&self) -> &MediaType {
        &self.descriptor.media_type
    }

    pub fn descriptor(&self) -> &PortDescriptor {
        &self.descriptor
    }

    pub fn is_dynamic(&self) -> bool {
        self.descriptor.dynamic
    }

    pub fn is_required(&self) -> bool {
        self.descriptor.required
    }

    pub fn is_linked(&self) -> bool {
        *self.linked.lock()
    }

    /// Mark the port linked. Returns false if it was already linked,
    /// leaving the flag set (single-producer guard for consumers).
    pub fn mark_linked(&self) -> bool {
        let mut linked = self.linked.lock();
        if *linked {
            false
        } else {
            *linked = true;
            true
        }
    }

    pub fn mark_unlinked(&self) {
        *self.linked.lock() = false;
    }
}

/// Names one port on one stage, e.g. the endpoints of a link.
///
/// The port field may be [`MediaType::WILDCARD`] on producer slots whose
/// concrete pad name is unknowable before run time (decoder-style stages
/// name their pads only once they appear).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub stage: String,
    pub port: String,
}

impl PortRef {
    pub fn new(stage: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            port: port.into(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.port == MediaType::WILDCARD
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stage, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_compatibility() {
        let raw = MediaType::new("video/x-raw");
        let h264 = MediaType::new("video/x-h264");
        let any = MediaType::any();

        assert!(raw.compatible(&raw));
        assert!(!raw.compatible(&h264));
        assert!(any.compatible(&raw));
        assert!(h264.compatible(&any));
    }

    #[test]
    fn test_linked_flag_single_producer_guard() {
        let port = Port::new(PortDescriptor::input("in", MediaType::any()));
        assert!(!port.is_linked());
        assert!(port.mark_linked());
        assert!(!port.mark_linked());
        assert!(port.is_linked());
        port.mark_unlinked();
        assert!(!port.is_linked());
    }

    #[test]
    fn test_descriptor_constructors() {
        let input = PortDescriptor::input("sink", MediaType::new("video/x-raw"));
        assert_eq!(input.direction, PortDirection::Input);
        assert!(input.required);
        assert!(!input.dynamic);

        let dynout = PortDescriptor::dynamic_output("src_0", MediaType::new("video/x-raw"));
        assert_eq!(dynout.direction, PortDirection::Output);
        assert!(dynout.dynamic);
        assert!(!dynout.required);

        let optout = PortDescriptor::output("out", MediaType::any()).optional();
        assert!(!optout.required);
    }

    #[test]
    fn test_port_ref_display() {
        let port = PortRef::new("encoder", "out");
        assert_eq!(port.to_string(), "encoder.out");
        assert!(!port.is_wildcard());
        assert!(PortRef::new("decoder", "*").is_wildcard());
    }
}
