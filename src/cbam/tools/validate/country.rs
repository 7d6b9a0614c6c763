use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Country {
    pub code: String,
    pub english_name: String,
    pub local_name: String,
    pub aliases: Vec<String>,
}

/// Case-insensitive country lookup built once from reference data.
///
/// Queries are tried against the English name, the local name, and the alias
/// index, then against the two-letter code.
#[derive(Debug, Clone, Default)]
pub struct CountryTable {
    countries: Vec<Country>,
    english: HashMap<String, usize>,
    local: HashMap<String, usize>,
    alias: HashMap<String, usize>,
    code: HashMap<String, usize>,
}

impl CountryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, country: Country) {
        let index = self.countries.len();
        if !country.english_name.is_empty() {
            self.english.insert(country.english_name.to_lowercase(), index);
        }
        if !country.local_name.is_empty() {
            self.local.insert(country.local_name.to_lowercase(), index);
        }
        for alias in country.aliases.iter().filter(|alias| !alias.is_empty()) {
            self.alias.insert(alias.to_lowercase(), index);
        }
        self.code.insert(country.code.to_lowercase(), index);
        self.countries.push(country);
    }

    pub fn find(&self, query: &str) -> Option<&Country> {
        let query = query.trim().to_lowercase();
        self.english
            .get(&query)
            .or_else(|| self.local.get(&query))
            .or_else(|| self.alias.get(&query))
            .or_else(|| self.code.get(&query))
            .map(|index| &self.countries[*index])
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}
