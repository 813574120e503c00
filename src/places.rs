//! Place registry.
//!
//! Holds the user-defined places for a run and reads/writes them in the
//! session JSON format:
//!
//! ```json
//! {
//!   "My Place": { "gps": ["B85005: SHEPLEY PRIMARY CARE LIMITED"], "icb": "NHS West Yorkshire ICB" },
//!   "places": ["My Place"]
//! }
//! ```

use crate::error::{PipelineError, Result};
use crate::models::Place;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Name of the placeholder place shown before any place is defined.
pub const DEFAULT_PLACE_NAME: &str = "Default Place";

/// Key holding the ordered list of place names in session JSON.
const PLACES_KEY: &str = "places";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlaceDefinition {
    gps: Vec<String>,
    icb: String,
}

/// Ordered set of places, unique by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceRegistry {
    places: Vec<Place>,
}

impl PlaceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding only the default place.
    pub fn with_default() -> Self {
        Self {
            places: vec![Self::default_place()],
        }
    }

    pub fn default_place() -> Place {
        Place::new(
            DEFAULT_PLACE_NAME,
            "NHS West Yorkshire ICB",
            [
                "B85005: SHEPLEY PRIMARY CARE LIMITED",
                "B85022: HONLEY SURGERY",
                "B85061: SKELMANTHORPE FAMILY DOCTORS",
                "B85026: KIRKBURTON HEALTH CENTRE",
            ],
        )
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn names(&self) -> Vec<&str> {
        self.places.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Place> {
        self.places.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// Copy of the places for one batch computation.
    pub fn snapshot(&self) -> Vec<Place> {
        self.places.clone()
    }

    /// Add a user-defined place, or replace the definition of an existing
    /// one in its current position.
    ///
    /// The first user place replaces the default place.
    pub fn add(&mut self, place: Place) -> Result<()> {
        if place.name.trim() == DEFAULT_PLACE_NAME {
            return Err(PipelineError::InvalidPlace(format!(
                "please rename your place to something other than '{}'",
                DEFAULT_PLACE_NAME
            )));
        }
        validate(&place)?;

        if self.places.len() == 1 && self.places[0].name == DEFAULT_PLACE_NAME {
            debug!("Replacing the default place with {}", place.name);
            self.places.clear();
        }

        self.upsert(place);
        Ok(())
    }

    /// Remove a place. Removing the last place restores the default place.
    pub fn remove(&mut self, name: &str) -> Result<Place> {
        let position = self
            .places
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| PipelineError::Registry(format!("no place named '{}'", name)))?;

        let removed = self.places.remove(position);
        if self.places.is_empty() {
            info!("All places deleted; '{}' reset to default", DEFAULT_PLACE_NAME);
            self.places.push(Self::default_place());
        }
        Ok(removed)
    }

    fn upsert(&mut self, place: Place) {
        match self.places.iter_mut().find(|p| p.name == place.name) {
            Some(existing) => *existing = place,
            None => self.places.push(place),
        }
    }

    /// Parse session JSON. Order follows the `places` list.
    pub fn from_session_json(json: &str) -> Result<Self> {
        let mut root: Map<String, Value> = serde_json::from_str(json)?;

        let names: Vec<String> = match root.remove(PLACES_KEY) {
            Some(value) => serde_json::from_value(value)?,
            None => {
                return Err(PipelineError::Registry(format!(
                    "session data has no '{}' list",
                    PLACES_KEY
                )))
            }
        };

        if names.is_empty() {
            warn!(
                "Session data lists no places; using '{}'",
                DEFAULT_PLACE_NAME
            );
            return Ok(Self::with_default());
        }

        let mut seen = HashSet::new();
        let mut registry = Self::new();
        for name in names {
            if !seen.insert(name.clone()) {
                return Err(PipelineError::Registry(format!(
                    "place '{}' is listed more than once",
                    name
                )));
            }
            let definition = root.remove(&name).ok_or_else(|| {
                PipelineError::Registry(format!("place '{}' is listed but not defined", name))
            })?;
            let definition: PlaceDefinition = serde_json::from_value(definition)?;

            let place = Place::new(name, definition.icb, definition.gps);
            validate(&place)?;
            registry.upsert(place);
        }

        Ok(registry)
    }

    /// Serialise to session JSON.
    pub fn to_session_json(&self) -> Result<String> {
        let mut root = Map::new();
        for place in &self.places {
            let definition = PlaceDefinition {
                gps: place.practices.clone(),
                icb: place.icb.clone(),
            };
            root.insert(place.name.clone(), serde_json::to_value(definition)?);
        }
        root.insert(PLACES_KEY.to_string(), serde_json::to_value(self.names())?);

        Ok(serde_json::to_string_pretty(&Value::Object(root))?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let registry = Self::from_session_json(&content)?;
        info!(
            "Loaded {} places from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_session_json()?)?;
        Ok(())
    }
}

fn validate(place: &Place) -> Result<()> {
    if place.name.trim().is_empty() {
        return Err(PipelineError::InvalidPlace(
            "please give your place a name".to_string(),
        ));
    }
    if place.name == PLACES_KEY {
        return Err(PipelineError::InvalidPlace(format!(
            "'{}' is reserved",
            PLACES_KEY
        )));
    }
    if place.icb.trim().is_empty() {
        return Err(PipelineError::InvalidPlace(format!(
            "place '{}' has no ICB",
            place.name
        )));
    }
    if place.practices.is_empty() {
        return Err(PipelineError::InvalidPlace(format!(
            "place '{}' needs one or more GP practices",
            place.name
        )));
    }
    Ok(())
}
