//! Combatant handles and the presentation contracts the core talks through

pub mod user;

pub use user::{MatchPreferences, PostMatchStats, User};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::GameVariant;
use crate::world::Vec3;

/// Stable identifier of a connected combatant
pub type CombatantId = Uuid;

/// Input-device class a combatant plays with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    KeyboardMouse,
    Touch,
    Controller,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 3] = [
        DeviceClass::KeyboardMouse,
        DeviceClass::Touch,
        DeviceClass::Controller,
    ];
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::KeyboardMouse => f.write_str("Keyboard/Mouse"),
            DeviceClass::Touch => f.write_str("Touch"),
            DeviceClass::Controller => f.write_str("Controller"),
        }
    }
}

/// Yaw and pitch in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotation {
    pub yaw: f64,
    pub pitch: f64,
}

/// Positional argument for a localized message or scoreboard line.
/// The core never formats text; renderers do.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Text(String),
    Int(i64),
    Duration(Duration),
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Text(s)
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Int(v)
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Arg::Int(v as i64)
    }
}

impl From<u32> for Arg {
    fn from(v: u32) -> Self {
        Arg::Int(v as i64)
    }
}

impl From<u64> for Arg {
    fn from(v: u64) -> Self {
        Arg::Int(v as i64)
    }
}

impl From<usize> for Arg {
    fn from(v: usize) -> Self {
        Arg::Int(v as i64)
    }
}

impl From<Duration> for Arg {
    fn from(d: Duration) -> Self {
        Arg::Duration(d)
    }
}

/// An on-screen title
#[derive(Debug, Clone, PartialEq)]
pub struct Title {
    pub key: &'static str,
    pub args: Vec<Arg>,
    pub subtitle: Option<(&'static str, Vec<Arg>)>,
    pub fade_in: Duration,
    pub stay: Duration,
    pub fade_out: Duration,
}

impl Title {
    pub fn new(key: &'static str) -> Self {
        Self {
            key,
            args: Vec::new(),
            subtitle: None,
            fade_in: Duration::from_millis(250),
            stay: Duration::from_secs(1),
            fade_out: Duration::from_millis(250),
        }
    }

    /// A title that wipes whatever is currently displayed
    pub fn blank() -> Self {
        Self::new("title.blank")
    }

    pub fn with_args(mut self, args: Vec<Arg>) -> Self {
        self.args = args;
        self
    }

    pub fn with_subtitle(mut self, key: &'static str, args: Vec<Arg>) -> Self {
        self.subtitle = Some((key, args));
        self
    }

    pub fn with_fade_in(mut self, d: Duration) -> Self {
        self.fade_in = d;
        self
    }

    pub fn with_duration(mut self, d: Duration) -> Self {
        self.stay = d;
        self
    }

    pub fn with_fade_out(mut self, d: Duration) -> Self {
        self.fade_out = d;
        self
    }
}

/// Item kit applied to a combatant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loadout {
    Lobby,
    Queue,
    Combat(GameVariant),
    /// Open-world kit, refilled on every respawn
    FreeForAll(GameVariant),
}

/// A stack of items as seen in an inventory snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub name: String,
    pub count: u32,
}

/// A connected combatant as exposed by the session layer.
///
/// Every method is fire-and-forget from the core's point of view and must
/// not call back into a match or provider.
pub trait Combatant: Send + Sync {
    fn id(&self) -> CombatantId;
    fn name(&self) -> String;

    fn display_name(&self) -> String {
        self.name()
    }

    fn position(&self) -> Vec3;
    fn rotation(&self) -> Rotation;
    /// Round-trip latency, already doubled
    fn latency(&self) -> Duration;
    fn device(&self) -> DeviceClass;
    fn locale(&self) -> String;

    fn teleport(&self, pos: Vec3);
    fn rotate(&self, delta_yaw: f64, delta_pitch: f64);
    fn set_immobile(&self);
    fn set_mobile(&self);
    /// Toggles whether the combatant may attack or use projectiles
    fn set_interactible(&self, interactible: bool);

    fn apply_loadout(&self, loadout: Loadout);
    /// Clears inventory, armour, held items and status effects
    fn clear_loadout(&self);
    fn inventory(&self) -> Vec<ItemStack>;
    fn set_attack_immunity(&self, d: Duration);
    fn set_spectating(&self, spectating: bool);
    fn show(&self, other: CombatantId);
    fn hide(&self, other: CombatantId);

    fn message(&self, key: &str, args: &[Arg]);
    fn send_title(&self, title: Title);
    fn play_sound(&self, sound: &str, pitch: f32);
}

/// A status panel line to render for one combatant
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    pub key: &'static str,
    pub args: Vec<Arg>,
}

impl Board {
    pub fn new(key: &'static str, args: Vec<Arg>) -> Self {
        Self { key, args }
    }
}

/// Renders scoreboards to combatants
pub trait ScoreboardRenderer: Send + Sync {
    fn render(&self, combatant: &Arc<dyn Combatant>, board: &Board);
}

/// Milliseconds of round-trip latency as used by compatibility windows
pub fn ping_of(combatant: &dyn Combatant) -> i64 {
    combatant.latency().as_millis() as i64
}
