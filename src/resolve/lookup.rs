//! Remote card-catalog oracle.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;

/// Canonical identity returned by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogHit {
    pub name: String,
    pub set_id: Option<String>,
}

/// Lookups never fail: transport, status and decoding problems are a miss
pub trait CatalogLookup: Send + Sync {
    fn by_number(&self, number: &str, set_hint: Option<&str>) -> Option<CatalogHit>;

    fn by_text(&self, name_fragment: Option<&str>, ability_fragment: Option<&str>, set_hint: Option<&str>)
    -> Option<CatalogHit>;
}

/// Catalog that never answers, for offline runs
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineCatalog;

impl CatalogLookup for OfflineCatalog {
    fn by_number(&self, _number: &str, _set_hint: Option<&str>) -> Option<CatalogHit> {
        None
    }

    fn by_text(&self, _name: Option<&str>, _ability: Option<&str>, _set_hint: Option<&str>) -> Option<CatalogHit> {
        None
    }
}

fn with_set(query: String, set_hint: Option<&str>) -> String {
    match set_hint {
        Some(set) if !set.is_empty() => format!("{query} set.id:{set}"),
        _ => query,
    }
}

/// `number:<n>` with an optional set restriction
pub fn number_query(number: &str, set_hint: Option<&str>) -> String {
    with_set(format!("number:{number}"), set_hint)
}

/// Name prefix search followed by an attack-text phrase search
pub fn text_queries(name_fragment: Option<&str>, ability_fragment: Option<&str>, set_hint: Option<&str>) -> Vec<String> {
    let mut queries = Vec::new();
    if let Some(name) = name_fragment.map(str::trim).filter(|s| !s.is_empty()) {
        let frag = name.split_whitespace().collect::<Vec<_>>().join("* ");
        queries.push(format!("name:{frag}*"));
    }
    if let Some(ability) = ability_fragment {
        let text = ability.trim().replace('"', "");
        if text.chars().count() >= 4 {
            queries.push(format!("attacks.text:\"{text}\""));
        }
    }
    queries.into_iter().map(|q| with_set(q, set_hint)).collect()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<ApiCard>,
}

#[derive(Debug, Deserialize)]
struct ApiCard {
    name: Option<String>,
    set: Option<ApiSet>,
}

#[derive(Debug, Deserialize)]
struct ApiSet {
    id: Option<String>,
}

/// Blocking client for the Pokémon TCG API
pub struct TcgApiClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: Option<String>,
    cache: Mutex<HashMap<(String, Option<String>), CatalogHit>>,
}

impl TcgApiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_url.clone(), config.api_key.clone(), config.api_timeout)
    }

    /// First card of a search, if it has a name
    fn search(&self, query: &str) -> Option<CatalogHit> {
        debug!(q = query, "catalog query");
        let mut request = self
            .agent
            .get(&self.base_url)
            .query("q", query)
            .query("select", "name,number,set");
        if let Some(key) = &self.api_key {
            request = request.set("X-Api-Key", key);
        }

        let response: SearchResponse = match request.call() {
            Ok(resp) => match resp.into_json() {
                Ok(body) => body,
                Err(e) => {
                    debug!(error = %e, "catalog response not understood");
                    return None;
                }
            },
            Err(e) => {
                debug!(error = %e, "catalog request failed");
                return None;
            }
        };
        debug!(results = response.data.len(), "catalog response");

        let first = response.data.into_iter().next()?;
        let name = first.name.filter(|n| !n.is_empty())?;
        Some(CatalogHit {
            name,
            set_id: first.set.and_then(|s| s.id),
        })
    }
}

impl CatalogLookup for TcgApiClient {
    fn by_number(&self, number: &str, set_hint: Option<&str>) -> Option<CatalogHit> {
        if number.is_empty() {
            return None;
        }
        let key = (number.to_string(), set_hint.map(str::to_string));
        if let Some(hit) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Some(hit.clone());
        }

        let hit = self.search(&number_query(number, set_hint))?;
        info!(number, name = %hit.name, set = hit.set_id.as_deref().unwrap_or("?"), "catalog hit");
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, hit.clone());
        Some(hit)
    }

    fn by_text(
        &self,
        name_fragment: Option<&str>,
        ability_fragment: Option<&str>,
        set_hint: Option<&str>,
    ) -> Option<CatalogHit> {
        text_queries(name_fragment, ability_fragment, set_hint)
            .iter()
            .find_map(|q| self.search(q))
    }
}
