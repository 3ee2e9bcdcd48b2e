//! Script settings announced by the engine
//!
//! Settings arrive in a versioned message. Each flag was introduced in a
//! specific protocol version; flags carried by a message older than that
//! version are ignored and keep their current value.

use serde::{Deserialize, Serialize};

/// Settings that shape how the type database is finalized and how scripts
/// are checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptSettings {
    pub automatic_imports: bool,
    pub float_is_float64: bool,
    pub use_angelscript_haze: bool,
    pub deprecate_static_class: bool,
    pub disallow_static_class: bool,
    pub expose_global_functions: bool,
    pub deprecate_actor_generics: bool,
    pub disallow_actor_generics: bool,
}

/// Decoded settings message from the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsMessage {
    pub version: u32,
    pub automatic_imports: Option<bool>,
    pub float_is_float64: Option<bool>,
    pub use_angelscript_haze: Option<bool>,
    pub deprecate_static_class: Option<bool>,
    pub disallow_static_class: Option<bool>,
    pub expose_global_functions: Option<bool>,
    pub deprecate_actor_generics: Option<bool>,
    pub disallow_actor_generics: Option<bool>,
    pub engine_supports_create_blueprint: Option<bool>,
}

const AUTOMATIC_IMPORTS_SINCE: u32 = 1;
const FLOAT_IS_FLOAT64_SINCE: u32 = 1;
const HAZE_SINCE: u32 = 2;
const STATIC_CLASS_SINCE: u32 = 3;
const GLOBAL_FUNCTIONS_SINCE: u32 = 4;
const ACTOR_GENERICS_SINCE: u32 = 5;
const CREATE_BLUEPRINT_SINCE: u32 = 6;

fn gated(version: u32, since: u32, value: Option<bool>, target: &mut bool) {
    if version >= since {
        if let Some(value) = value {
            *target = value;
        }
    }
}

impl SettingsMessage {
    /// Applies every flag the message's version is allowed to carry.
    ///
    /// Returns the create-blueprint capability when the message announces it.
    pub fn apply_to(&self, settings: &mut ScriptSettings) -> Option<bool> {
        let v = self.version;
        gated(v, AUTOMATIC_IMPORTS_SINCE, self.automatic_imports, &mut settings.automatic_imports);
        gated(v, FLOAT_IS_FLOAT64_SINCE, self.float_is_float64, &mut settings.float_is_float64);
        gated(v, HAZE_SINCE, self.use_angelscript_haze, &mut settings.use_angelscript_haze);
        gated(v, STATIC_CLASS_SINCE, self.deprecate_static_class, &mut settings.deprecate_static_class);
        gated(v, STATIC_CLASS_SINCE, self.disallow_static_class, &mut settings.disallow_static_class);
        gated(v, GLOBAL_FUNCTIONS_SINCE, self.expose_global_functions, &mut settings.expose_global_functions);
        gated(v, ACTOR_GENERICS_SINCE, self.deprecate_actor_generics, &mut settings.deprecate_actor_generics);
        gated(v, ACTOR_GENERICS_SINCE, self.disallow_actor_generics, &mut settings.disallow_actor_generics);

        if v >= CREATE_BLUEPRINT_SINCE {
            self.engine_supports_create_blueprint
        } else {
            None
        }
    }
}
