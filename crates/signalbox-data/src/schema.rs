//! Serde structs for layout files.
//!
//! Aspects and references are plain strings on disk and are resolved into
//! core types by the builder.

use serde::Deserialize;

use signalbox_core::id::BlockPos;
use signalbox_core::node::BoxVariant;

/// A whole layout: free-standing controllers and boxes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayoutData {
    #[serde(default)]
    pub controllers: Vec<ControllerData>,
    #[serde(default)]
    pub boxes: Vec<BoxData>,
}

/// A controller not owned by a box, such as a block signal.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerData {
    pub name: String,
    pub pos: [i32; 3],
    /// Initial aspect; the controller starts green when omitted.
    #[serde(default)]
    pub aspect: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoxData {
    pub pos: [i32; 3],
    pub variant: VariantData,
    /// Makes a controller box addressable from other boxes' `bindings`.
    #[serde(default)]
    pub name: Option<String>,
    /// Aspects the box acts on. The box default applies when omitted.
    #[serde(default)]
    pub actions: Option<Vec<String>>,
    /// Controller names this receiver listens to.
    #[serde(default)]
    pub bindings: Vec<String>,
    #[serde(default)]
    pub default_aspect: Option<String>,
    #[serde(default)]
    pub powered_aspect: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantData {
    Receiver,
    Controller,
}

impl From<VariantData> for BoxVariant {
    fn from(value: VariantData) -> Self {
        match value {
            VariantData::Receiver => BoxVariant::Receiver,
            VariantData::Controller => BoxVariant::Controller,
        }
    }
}

pub fn to_pos([x, y, z]: [i32; 3]) -> BlockPos {
    BlockPos::new(x, y, z)
}
