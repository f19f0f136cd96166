#![allow(dead_code)]
use instapool::{Attachment, GroupId, PoolAllocator};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

static NEXT_ENTITY: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Place {
    Root,
    Idle(GroupId),
    Active,
    Under(&'static str),
}

#[derive(Debug, Clone)]
pub struct Record {
    pub template: &'static str,
    pub active: bool,
    pub place: Place,
    pub resets: u32,
    pub broken: bool,
}

#[derive(Debug)]
pub struct SpawnError(pub &'static str);

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot spawn {}", self.0)
    }
}

impl std::error::Error for SpawnError {}

/// A tiny host world that records everything the pool asks of it.
#[derive(Debug, Default)]
pub struct World {
    pub live: HashMap<Entity, Record>,
    pub graveyard: Arc<Mutex<Vec<Entity>>>,
    pub failing: Option<&'static str>,
    pub forbidden: Option<&'static str>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns an entity outside of any pool.
    pub fn spawn(&mut self, template: &'static str) -> Entity {
        let entity = Entity(NEXT_ENTITY.fetch_add(1, Ordering::Relaxed));
        self.live.insert(
            entity,
            Record {
                template,
                active: true,
                place: Place::Root,
                resets: 0,
                broken: false,
            },
        );
        entity
    }

    pub fn record(&self, entity: Entity) -> &Record {
        &self.live[&entity]
    }

    pub fn is_live(&self, entity: Entity) -> bool {
        self.live.contains_key(&entity)
    }

    pub fn destroyed(&self) -> Vec<Entity> {
        self.graveyard.lock().unwrap().clone()
    }
}

impl PoolAllocator for World {
    type Template = &'static str;
    type Instance = Entity;
    type Parent = &'static str;
    type Error = SpawnError;

    fn allocate(&mut self, template: &&'static str) -> Result<Entity, SpawnError> {
        if self.failing == Some(*template) {
            return Err(SpawnError(*template));
        }
        Ok(self.spawn(*template))
    }

    fn destroy(&mut self, instance: Entity) {
        let mut graveyard = self.graveyard.lock().unwrap();
        assert!(!graveyard.contains(&instance), "{instance:?} destroyed twice");
        graveyard.push(instance);
        self.live.remove(&instance);
    }

    fn set_active(&mut self, instance: &Entity, active: bool) {
        if let Some(record) = self.live.get_mut(instance) {
            record.active = active;
        }
    }

    fn attach(&mut self, instance: &Entity, to: Attachment<'_, &'static str>) {
        if let Some(record) = self.live.get_mut(instance) {
            record.place = match to {
                Attachment::Idle(group) => Place::Idle(group),
                Attachment::Active => Place::Active,
                Attachment::Parent(parent) => Place::Under(parent),
            };
        }
    }

    fn reset(&mut self, instance: &Entity) {
        if let Some(record) = self.live.get_mut(instance) {
            record.resets += 1;
        }
    }

    fn is_valid(&self, instance: &Entity) -> bool {
        self.live.get(instance).is_some_and(|record| !record.broken)
    }

    fn is_valid_template(&self, template: &&'static str) -> bool {
        self.forbidden != Some(*template)
    }
}
