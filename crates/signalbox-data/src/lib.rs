//! Data-driven setup for signal-box worlds.
//!
//! Reads a [`SignalConfig`] and a layout (controllers, boxes, bindings) from
//! RON, TOML or JSON files and builds a server [`SignalWorld`] from them.

pub mod loader;
pub mod schema;

use std::path::Path;

use signalbox_core::action::ActionMapping;
use signalbox_core::aspect::SignalAspect;
use signalbox_core::config::SignalConfig;
use signalbox_core::host::BlockHost;
use signalbox_core::id::ControllerKey;
use signalbox_core::node::{BoxNode, BoxVariant, Side};
use signalbox_core::packet::GuiUpdate;
use signalbox_core::world::{SignalWorld, WorldError};

pub use loader::DataLoadError;
use loader::{NameTable, deserialize_file, find_data_file, require_data_file};
use schema::{LayoutData, to_pos};

/// Base name of the optional config file in a data directory.
pub const CONFIG_FILE: &str = "signal_config";
/// Base name of the required layout file in a data directory.
pub const LAYOUT_FILE: &str = "layout";

// ===========================================================================
// Config
// ===========================================================================

pub fn try_load_signal_config(path: &Path) -> Result<SignalConfig, DataLoadError> {
    let config: SignalConfig = deserialize_file(path)?;
    Ok(config.sanitized())
}

/// Load a config file, falling back to defaults if it is missing or invalid.
pub fn load_signal_config(path: &Path) -> SignalConfig {
    match try_load_signal_config(path) {
        Ok(config) => {
            tracing::debug!(path = %path.display(), "loaded signal config");
            config
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "using default signal config");
            SignalConfig::default()
        }
    }
}

// ===========================================================================
// Layout
// ===========================================================================

pub fn load_layout(path: &Path) -> Result<LayoutData, DataLoadError> {
    deserialize_file(path)
}

fn parse_aspect(name: &str, file: &Path) -> Result<SignalAspect, DataLoadError> {
    name.parse().map_err(|_| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind: "aspect",
    })
}

fn parse_optional(name: Option<&String>, file: &Path) -> Result<Option<SignalAspect>, DataLoadError> {
    name.map(|n| parse_aspect(n, file)).transpose()
}

/// Build a server world from a parsed layout. `file` is only used for error
/// reporting.
///
/// Controllers and boxes are placed first; aspects are applied next and
/// bindings last, so a binding may name a controller box declared later in
/// the file.
pub fn build_world<H: BlockHost>(
    layout: &LayoutData,
    file: &Path,
    config: SignalConfig,
    host: H,
) -> Result<SignalWorld<H>, DataLoadError> {
    let world_err = |source: WorldError| DataLoadError::World {
        file: file.to_path_buf(),
        source,
    };
    let mut world = SignalWorld::new(Side::Server, config, host);
    let mut names: NameTable<ControllerKey> = NameTable::new(file);

    for controller in &layout.controllers {
        let key = ControllerKey(to_pos(controller.pos));
        names.declare(&controller.name, key)?;
        world
            .add_controller(key, controller.name.clone())
            .map_err(world_err)?;
    }

    for data in &layout.boxes {
        let pos = to_pos(data.pos);
        let variant = BoxVariant::from(data.variant);
        world.add_box(pos, variant).map_err(world_err)?;

        if let Some(name) = &data.name {
            if variant != BoxVariant::Controller {
                return Err(DataLoadError::Parse {
                    file: file.to_path_buf(),
                    detail: format!("box '{name}' at {pos} is named but owns no controller"),
                });
            }
            names.declare(name, ControllerKey(pos))?;
        }

        if let Some(actions) = &data.actions {
            let aspects = actions
                .iter()
                .map(|a| parse_aspect(a, file))
                .collect::<Result<Vec<_>, _>>()?;
            world
                .apply_gui(pos, &GuiUpdate::Actions(ActionMapping::from_aspects(aspects)))
                .map_err(world_err)?;
        }

        let default_aspect = parse_optional(data.default_aspect.as_ref(), file)?;
        let powered_aspect = parse_optional(data.powered_aspect.as_ref(), file)?;
        if default_aspect.is_some() || powered_aspect.is_some() {
            let current = world
                .node_at(pos)
                .and_then(BoxNode::source)
                .copied()
                .unwrap_or_default();
            let update = GuiUpdate::ControllerAspects {
                default_aspect: default_aspect.unwrap_or(current.default_aspect),
                powered_aspect: powered_aspect.unwrap_or(current.powered_aspect),
            };
            world.apply_gui(pos, &update).map_err(world_err)?;
        }
    }

    for controller in &layout.controllers {
        if let Some(aspect) = parse_optional(controller.aspect.as_ref(), file)? {
            let key = ControllerKey(to_pos(controller.pos));
            world.set_controller_aspect(key, aspect).map_err(world_err)?;
        }
    }

    for data in &layout.boxes {
        for name in &data.bindings {
            let key = names.resolve(name, "controller")?;
            world.bind_receiver(to_pos(data.pos), key).map_err(world_err)?;
        }
    }

    tracing::debug!(
        file = %file.display(),
        boxes = world.len(),
        controllers = world.network().len(),
        "layout built"
    );
    Ok(world)
}

/// Load `signal_config.*` (optional) and `layout.*` (required) from `dir`
/// and build a server world.
pub fn load_world<H: BlockHost>(dir: &Path, host: H) -> Result<SignalWorld<H>, DataLoadError> {
    let config = match find_data_file(dir, CONFIG_FILE)? {
        Some(path) => load_signal_config(&path),
        None => SignalConfig::default(),
    };
    let layout_path = require_data_file(dir, LAYOUT_FILE)?;
    let layout = load_layout(&layout_path)?;
    build_world(&layout, &layout_path, config, host)
}
