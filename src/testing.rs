//! Recording collaborators shared by the unit tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::app::{Registry, Services};
use crate::combatant::{
    Arg, Board, Combatant, CombatantId, DeviceClass, ItemStack, Loadout, MatchPreferences,
    Rotation, ScoreboardRenderer, Title, User,
};
use crate::game::{ArenaCatalog, ArenaTemplate, GameVariant};
use crate::notify::{MatchEvent, Notifier};
use crate::rating::{MemoryRatingStore, RatingRecord};
use crate::world::{ArenaWorld, BlockPos, Dimensions, Lobby, Region, Structure, Vec3};

/// Something a combatant was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message { key: String, args: Vec<Arg> },
    Title(Title),
    Teleport(Vec3),
    Rotate(f64, f64),
    Loadout(Loadout),
    ClearLoadout,
    Sound(String),
}

#[derive(Debug)]
struct MockState {
    latency: Duration,
    device: DeviceClass,
    position: Vec3,
    rotation: Rotation,
    immobile: bool,
    interactible: bool,
    spectating: bool,
    loadout: Option<Loadout>,
    immunity: Duration,
    hidden: Vec<CombatantId>,
    events: Vec<Event>,
}

type Observer = Arc<dyn Fn(&Event) + Send + Sync>;

/// A combatant that records every call
pub struct MockCombatant {
    id: CombatantId,
    name: String,
    state: Mutex<MockState>,
    observer: Mutex<Option<Observer>>,
}

impl std::fmt::Debug for MockCombatant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCombatant")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl MockCombatant {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            state: Mutex::new(MockState {
                latency: Duration::from_millis(50),
                device: DeviceClass::KeyboardMouse,
                position: Vec3::default(),
                rotation: Rotation::default(),
                immobile: false,
                interactible: true,
                spectating: false,
                loadout: None,
                immunity: Duration::ZERO,
                hidden: Vec::new(),
                events: Vec::new(),
            }),
            observer: Mutex::new(None),
        })
    }

    /// Run `f` on every recorded event, after the mock's own lock is released
    pub fn observe(&self, f: impl Fn(&Event) + Send + Sync + 'static) {
        *self.observer.lock() = Some(Arc::new(f));
    }

    pub fn with_latency(self: Arc<Self>, ms: u64) -> Arc<Self> {
        self.state.lock().latency = Duration::from_millis(ms);
        self
    }

    pub fn id(&self) -> CombatantId {
        self.id
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    pub fn received(&self, key: &str) -> bool {
        self.count_of(key) > 0
    }

    pub fn count_of(&self, key: &str) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, Event::Message { key: k, .. } if k == key))
            .count()
    }

    /// Arguments of the last message with `key`
    pub fn args_of(&self, key: &str) -> Option<Vec<Arg>> {
        self.state.lock().events.iter().rev().find_map(|e| match e {
            Event::Message { key: k, args } if k == key => Some(args.clone()),
            _ => None,
        })
    }

    pub fn titles(&self) -> Vec<String> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Title(t) => Some(t.key.to_string()),
                _ => None,
            })
            .collect()
    }

    pub fn last_teleport(&self) -> Option<Vec3> {
        self.state.lock().events.iter().rev().find_map(|e| match e {
            Event::Teleport(pos) => Some(*pos),
            _ => None,
        })
    }

    pub fn has_loadout(&self, loadout: Loadout) -> bool {
        self.state.lock().loadout == Some(loadout)
    }

    pub fn is_immobile(&self) -> bool {
        self.state.lock().immobile
    }

    pub fn is_interactible(&self) -> bool {
        self.state.lock().interactible
    }

    pub fn is_spectating(&self) -> bool {
        self.state.lock().spectating
    }

    pub fn immunity(&self) -> Duration {
        self.state.lock().immunity
    }

    pub fn hidden(&self) -> Vec<CombatantId> {
        self.state.lock().hidden.clone()
    }

    fn record(&self, event: Event) {
        self.state.lock().events.push(event.clone());
        let observer = self.observer.lock().clone();
        if let Some(f) = observer {
            f(&event);
        }
    }
}

impl Combatant for MockCombatant {
    fn id(&self) -> CombatantId {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn position(&self) -> Vec3 {
        self.state.lock().position
    }

    fn rotation(&self) -> Rotation {
        self.state.lock().rotation
    }

    fn latency(&self) -> Duration {
        self.state.lock().latency
    }

    fn device(&self) -> DeviceClass {
        self.state.lock().device
    }

    fn locale(&self) -> String {
        "en_US".to_string()
    }

    fn teleport(&self, pos: Vec3) {
        self.state.lock().position = pos;
        self.record(Event::Teleport(pos));
    }

    fn rotate(&self, delta_yaw: f64, delta_pitch: f64) {
        {
            let mut state = self.state.lock();
            state.rotation.yaw += delta_yaw;
            state.rotation.pitch += delta_pitch;
        }
        self.record(Event::Rotate(delta_yaw, delta_pitch));
    }

    fn set_immobile(&self) {
        self.state.lock().immobile = true;
    }

    fn set_mobile(&self) {
        self.state.lock().immobile = false;
    }

    fn set_interactible(&self, interactible: bool) {
        self.state.lock().interactible = interactible;
    }

    fn apply_loadout(&self, loadout: Loadout) {
        self.state.lock().loadout = Some(loadout);
        self.record(Event::Loadout(loadout));
    }

    fn clear_loadout(&self) {
        self.state.lock().loadout = None;
        self.record(Event::ClearLoadout);
    }

    fn inventory(&self) -> Vec<ItemStack> {
        match self.state.lock().loadout {
            Some(Loadout::Combat(variant) | Loadout::FreeForAll(variant)) => vec![ItemStack {
                name: format!("{}_kit", variant.slug()),
                count: 1,
            }],
            _ => Vec::new(),
        }
    }

    fn set_attack_immunity(&self, d: Duration) {
        self.state.lock().immunity = d;
    }

    fn set_spectating(&self, spectating: bool) {
        self.state.lock().spectating = spectating;
    }

    fn show(&self, other: CombatantId) {
        self.state.lock().hidden.retain(|id| *id != other);
    }

    fn hide(&self, other: CombatantId) {
        self.state.lock().hidden.push(other);
    }

    fn message(&self, key: &str, args: &[Arg]) {
        self.record(Event::Message {
            key: key.to_string(),
            args: args.to_vec(),
        });
    }

    fn send_title(&self, title: Title) {
        self.record(Event::Title(title));
    }

    fn play_sound(&self, sound: &str, _pitch: f32) {
        self.record(Event::Sound(sound.to_string()));
    }
}

/// Records structures, cleared blocks and entity sweeps
#[derive(Debug, Default)]
pub struct MockWorld {
    builds: Mutex<Vec<(BlockPos, String)>>,
    cleared: Mutex<Vec<BlockPos>>,
    sweeps: Mutex<Vec<Region>>,
    added: Mutex<Vec<CombatantId>>,
}

impl MockWorld {
    /// `(origin, "arena:<name>" | "empty")` in build order
    pub fn builds(&self) -> Vec<(BlockPos, String)> {
        self.builds.lock().clone()
    }

    pub fn cleared(&self) -> Vec<BlockPos> {
        self.cleared.lock().clone()
    }

    pub fn sweeps(&self) -> Vec<Region> {
        self.sweeps.lock().clone()
    }

    pub fn added(&self) -> Vec<CombatantId> {
        self.added.lock().clone()
    }
}

impl ArenaWorld for MockWorld {
    fn build_structure(&self, origin: BlockPos, structure: Structure<'_>) {
        let kind = match structure {
            Structure::Arena(t) => format!("arena:{}", t.name),
            Structure::Empty(_) => "empty".to_string(),
        };
        self.builds.lock().push((origin, kind));
    }

    fn clear_block(&self, pos: BlockPos) {
        self.cleared.lock().push(pos);
    }

    fn remove_entities_within(&self, region: Region) {
        self.sweeps.lock().push(region);
    }

    fn add_combatant(&self, combatant: &Arc<dyn Combatant>) {
        self.added.lock().push(combatant.id());
    }
}

/// Tracks lobby membership
#[derive(Debug, Default)]
pub struct MockLobby {
    members: Mutex<HashMap<CombatantId, usize>>,
    adds: Mutex<HashMap<CombatantId, usize>>,
}

impl MockLobby {
    pub fn contains(&self, id: CombatantId) -> bool {
        self.members.lock().contains_key(&id)
    }

    /// How many times a combatant was sent to the lobby
    pub fn add_count(&self, id: CombatantId) -> usize {
        self.adds.lock().get(&id).copied().unwrap_or(0)
    }
}

impl Lobby for MockLobby {
    fn add(&self, combatant: &Arc<dyn Combatant>) {
        self.members.lock().insert(combatant.id(), 1);
        *self.adds.lock().entry(combatant.id()).or_default() += 1;
    }

    fn remove(&self, combatant: &Arc<dyn Combatant>) {
        self.members.lock().remove(&combatant.id());
    }
}

/// Keeps every rendered board per combatant
#[derive(Debug, Default)]
pub struct RecordingScoreboard {
    boards: Mutex<HashMap<CombatantId, Vec<Board>>>,
}

impl RecordingScoreboard {
    pub fn boards_for(&self, id: CombatantId) -> Vec<Board> {
        self.boards.lock().get(&id).cloned().unwrap_or_default()
    }
}

impl ScoreboardRenderer for RecordingScoreboard {
    fn render(&self, combatant: &Arc<dyn Combatant>, board: &Board) {
        self.boards
            .lock()
            .entry(combatant.id())
            .or_default()
            .push(board.clone());
    }
}

/// Keeps every notified event
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<MatchEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<MatchEvent> {
        self.events.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: MatchEvent) {
        self.events.lock().push(event);
    }
}

/// A record with the same rating globally and in every variant
pub fn record_with(rating: i32) -> RatingRecord {
    let mut record = RatingRecord {
        rating,
        ..RatingRecord::default()
    };
    for variant in GameVariant::ALL {
        record.set_variant_rating(variant, rating);
    }
    record
}

/// A standalone user backed by its own in-memory store
pub fn user_with(c: &Arc<MockCombatant>, rating: i32, tolerance: Option<u32>) -> Arc<User> {
    Arc::new(User::new(
        c.clone(),
        record_with(rating),
        MatchPreferences {
            ping_tolerance: tolerance,
            ..MatchPreferences::default()
        },
        Arc::new(MemoryRatingStore::default()),
    ))
}

/// An arena supporting every variant with spawns 25 blocks apart
pub fn test_arena() -> ArenaTemplate {
    ArenaTemplate {
        name: "Test".to_string(),
        variants: GameVariant::ALL.to_vec(),
        dimensions: Dimensions { x: 40, y: 20, z: 60 },
        spawns: vec![
            Vec3::new(20.0, 5.0, 5.0),
            Vec3::new(20.0, 5.0, 30.0),
            Vec3::new(20.0, 5.0, 55.0),
        ],
    }
}

/// Mock collaborators wired into a `Services`
pub struct Fixture {
    pub services: Services,
    pub world: Arc<MockWorld>,
    pub lobby: Arc<MockLobby>,
    pub scoreboard: Arc<RecordingScoreboard>,
    pub notifier: Arc<RecordingNotifier>,
    pub ratings: Arc<MemoryRatingStore>,
}

impl Fixture {
    pub fn new() -> Self {
        let world = Arc::new(MockWorld::default());
        let lobby = Arc::new(MockLobby::default());
        let scoreboard = Arc::new(RecordingScoreboard::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let ratings = Arc::new(MemoryRatingStore::default());
        let arenas = ArenaCatalog::from_templates([test_arena()]).expect("valid test arena");

        let services = Services {
            registry: Arc::new(Registry::new()),
            world: world.clone(),
            lobby: lobby.clone(),
            scoreboard: scoreboard.clone(),
            ratings: ratings.clone(),
            notifier: notifier.clone(),
            arenas: Arc::new(arenas),
        };
        Self {
            services,
            world,
            lobby,
            scoreboard,
            notifier,
            ratings,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.services.registry
    }

    pub fn arena(&self) -> Arc<ArenaTemplate> {
        self.services
            .arenas
            .by_name("Test")
            .expect("fixture arena is registered")
    }

    /// A user that is not registered and does not persist to the fixture store
    pub fn unregistered_user(&self, c: &Arc<MockCombatant>, rating: i32) -> Arc<User> {
        user_with(c, rating, None)
    }

    /// A registered user persisting to the fixture store
    pub fn user(&self, c: &Arc<MockCombatant>, rating: i32) -> Arc<User> {
        self.user_with_tolerance(c, rating, None)
    }

    pub fn user_with_tolerance(
        &self,
        c: &Arc<MockCombatant>,
        rating: i32,
        tolerance: Option<u32>,
    ) -> Arc<User> {
        let user = Arc::new(User::new(
            c.clone(),
            record_with(rating),
            MatchPreferences {
                ping_tolerance: tolerance,
                ..MatchPreferences::default()
            },
            self.ratings.clone(),
        ));
        self.services.registry.register(user.clone());
        user
    }
}
