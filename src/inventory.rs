//! Term inventory: the catalog questions are drawn from and grids are built from
//!
//! The catalog itself is external content. This module only needs a
//! collection of records with at least 25 distinct terms.

use crate::error::{GameError, GameResult};
use crate::types::{Grid, Term, GRID_CELLS};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One catalog entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TermRecord {
    pub term: Term,
    #[serde(alias = "description")]
    pub prompt_text: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TermInventory {
    records: Vec<TermRecord>,
}

impl TermInventory {
    /// Build from raw records. Blank terms are dropped and duplicates collapse (first wins).
    pub fn from_records(records: impl IntoIterator<Item = TermRecord>) -> Self {
        let mut seen = HashSet::new();
        let records = records
            .into_iter()
            .filter_map(|mut r| {
                r.term = r.term.trim().to_string();
                if r.term.is_empty() || !seen.insert(r.term.clone()) {
                    return None;
                }
                Some(r)
            })
            .collect();
        Self { records }
    }

    /// Load a JSON array of records
    pub fn from_json_file(path: &Path) -> GameResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<TermRecord> = serde_json::from_str(&raw)?;
        let inventory = Self::from_records(records);
        tracing::info!(
            "Loaded {} terms from {}",
            inventory.len(),
            path.display()
        );
        Ok(inventory)
    }

    /// Catalog shipped with the binary
    pub fn builtin() -> Self {
        Self::from_records(BUILTIN_CATALOG.iter().map(|(term, prompt, category)| TermRecord {
            term: term.to_string(),
            prompt_text: prompt.to_string(),
            category: Some(category.to_string()),
        }))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TermRecord] {
        &self.records
    }

    pub fn get(&self, term: &str) -> Option<&TermRecord> {
        self.records.iter().find(|r| r.term == term)
    }

    /// Fail unless a full grid can be built
    pub fn ensure_playable(&self) -> GameResult<()> {
        if self.records.len() < GRID_CELLS {
            return Err(GameError::InsufficientInventory {
                available: self.records.len(),
                required: GRID_CELLS,
            });
        }
        Ok(())
    }

    /// Draw 25 distinct terms without replacement and lay them out row-major
    pub fn build_grid(&self) -> GameResult<Grid> {
        self.ensure_playable()?;

        let mut terms: Vec<Term> = self.records.iter().map(|r| r.term.clone()).collect();
        terms.shuffle(&mut rand::rng());
        terms.truncate(GRID_CELLS);

        Grid::from_labels(&terms).ok_or(GameError::InsufficientInventory {
            available: terms.len(),
            required: GRID_CELLS,
        })
    }

    /// Records whose term is not yet in the ledger
    pub fn unresolved<'a>(&'a self, resolved: &'a [Term]) -> impl Iterator<Item = &'a TermRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| !resolved.iter().any(|t| *t == r.term))
    }
}

/// (term, prompt, category)
const BUILTIN_CATALOG: &[(&str, &str, &str)] = &[
    ("Commodity", "A product of labour made to be exchanged rather than consumed by its maker.", "Commodities"),
    ("Use Value", "The usefulness of a thing, its capacity to satisfy a human want.", "Commodities"),
    ("Exchange Value", "The proportion in which one kind of commodity trades for another.", "Commodities"),
    ("Abstract Labour", "Human labour in general, stripped of its concrete form, that creates value.", "Commodities"),
    ("Concrete Labour", "Labour in a specific useful form, such as tailoring or weaving.", "Commodities"),
    ("Socially Necessary Labour Time", "The time required to produce a good under normal conditions of production with average skill and intensity.", "Value"),
    ("Law of Value", "Production and exchange of commodities are regulated by socially necessary labour time.", "Value"),
    ("Money", "The universal equivalent commodity in which all other commodities express their value.", "Money"),
    ("Price", "The monetary expression of value.", "Money"),
    ("Means of Circulation", "The function of money as intermediary in the exchange of commodities.", "Money"),
    ("Capital", "Value that expands itself through the exploitation of wage labour.", "Capital"),
    ("Labour Power", "The capacity to work, sold by the worker as a commodity.", "Capital"),
    ("Surplus Value", "The value created by workers beyond the value of their own labour power.", "Surplus Value"),
    ("Absolute Surplus Value", "Surplus value obtained by lengthening the working day.", "Surplus Value"),
    ("Relative Surplus Value", "Surplus value obtained by shortening necessary labour time.", "Surplus Value"),
    ("Extra Surplus Value", "Surplus value gained by a firm whose individual value is below the social value.", "Surplus Value"),
    ("Constant Capital", "The part of capital turned into means of production, whose value is transferred without change.", "Capital"),
    ("Variable Capital", "The part of capital spent on labour power, which changes in magnitude during production.", "Capital"),
    ("Rate of Surplus Value", "The ratio of surplus value to variable capital.", "Surplus Value"),
    ("Capital Accumulation", "The conversion of surplus value back into capital.", "Accumulation"),
    ("Concentration of Capital", "Growth of an individual capital through accumulation of its own surplus value.", "Accumulation"),
    ("Centralization of Capital", "Growth of capital by merging existing capitals into a larger one.", "Accumulation"),
    ("Organic Composition of Capital", "The value ratio of constant to variable capital, reflecting the technical composition.", "Accumulation"),
    ("Profit", "Surplus value regarded as the offspring of the whole advanced capital.", "Distribution"),
    ("Average Profit", "Equal profit on equal capital arising from competition between sectors.", "Distribution"),
    ("Price of Production", "Cost price plus average profit.", "Distribution"),
    ("Ground Rent", "The part of surplus value paid to landowners for the use of land.", "Distribution"),
    ("Interest", "The share of profit paid by the functioning capitalist to the lender of money capital.", "Distribution"),
    ("Monopoly", "An alliance of large firms controlling production and sale of a commodity to earn high profits.", "Monopoly"),
    ("Finance Capital", "The merging of monopoly banking capital with monopoly industrial capital.", "Monopoly"),
    ("Export of Capital", "Investing capital abroad to appropriate surplus value in other countries.", "Monopoly"),
    ("State Monopoly Capitalism", "The fusion of monopoly power with the power of the state.", "Monopoly"),
];
