//! Test fixtures and builders for pricing tests.
//!
//! Reusable builders for synthetic commodity tables, so individual tests do
//! not have to assemble raw columns by hand.

use crate::data::{Cell, RawColumn, RawTable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;

const VARIETIES: [(&str, &str, f64); 7] = [
    ("Wheat", "Grain", 25.0),
    ("Rice", "Grain", 35.0),
    ("Corn", "Grain", 22.0),
    ("Tomato", "Vegetable", 30.0),
    ("Potato", "Vegetable", 20.0),
    ("Onion", "Vegetable", 25.0),
    ("Soybean", "Oil Seed", 40.0),
];
const REGIONS: [(&str, f64); 5] = [
    ("North", 1.5),
    ("South", -0.5),
    ("East", 0.0),
    ("West", 0.8),
    ("Central", -1.2),
];
const GRADES: [(&str, f64); 4] = [("Premium", 4.0), ("A", 2.0), ("B", 0.0), ("C", -2.0)];

fn text_column(name: &str, values: &[&str]) -> RawColumn {
    RawColumn::new(name, values.iter().map(|v| Cell::Text(v.to_string())).collect())
}

fn number_column(name: &str, values: &[f64]) -> RawColumn {
    RawColumn::new(name, values.iter().map(|&v| Cell::Number(v)).collect())
}

/// The three-lot training table used throughout the documentation.
pub fn three_row_table() -> RawTable {
    RawTable::new(vec![
        text_column("product_category", &["Grain", "Grain", "Vegetable"]),
        text_column("variety", &["Wheat", "Corn", "Tomato"]),
        text_column("market_region", &["North", "South", "East"]),
        text_column("grade", &["A", "B", "A"]),
        number_column("quantity_kg", &[100.0, 200.0, 50.0]),
        number_column("moisture_pct", &[12.0, 14.0, 90.0]),
        number_column("days_since_harvest", &[5.0, 3.0, 1.0]),
        number_column("historical_avg_price", &[20.0, 18.0, 30.0]),
        number_column("price_per_kg", &[22.0, 19.5, 31.0]),
    ])
    .expect("fixture columns have equal heights")
}

/// Copy of `table` with every cell of `column` set to the text `value`.
pub fn replace_text(table: &RawTable, column: &str, value: &str) -> RawTable {
    let columns = table
        .column_names()
        .into_iter()
        .map(|name| {
            let original = table.column(name).expect("name comes from the table");
            if name == column {
                RawColumn::new(name, vec![Cell::Text(value.to_string()); table.height()])
            } else {
                original.clone()
            }
        })
        .collect();
    RawTable::new(columns).expect("heights are preserved")
}

/// Synthetic commodity data with a known linear price signal.
pub struct SyntheticData {
    pub table: RawTable,
    pub prices: Vec<f64>,
    pub historical_price_effect: f64,
    pub moisture_effect: f64,
}

/// Builder for synthetic commodity tables.
pub struct SyntheticDataBuilder {
    n_rows: usize,
    noise_sd: f64,
    seed: u64,
}

impl SyntheticDataBuilder {
    pub fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            noise_sd: 1.0,
            seed: 42,
        }
    }

    pub fn noise_sd(mut self, noise_sd: f64) -> Self {
        self.noise_sd = noise_sd;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> SyntheticData {
        const HISTORICAL_PRICE_EFFECT: f64 = 0.6;
        const MOISTURE_EFFECT: f64 = -0.05;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = Normal::new(0.0, self.noise_sd).expect("valid noise sd");

        let mut categories = Vec::with_capacity(self.n_rows);
        let mut varieties = Vec::with_capacity(self.n_rows);
        let mut regions = Vec::with_capacity(self.n_rows);
        let mut grades = Vec::with_capacity(self.n_rows);
        let mut quantity = Vec::with_capacity(self.n_rows);
        let mut moisture = Vec::with_capacity(self.n_rows);
        let mut days = Vec::with_capacity(self.n_rows);
        let mut historical = Vec::with_capacity(self.n_rows);
        let mut prices = Vec::with_capacity(self.n_rows);

        for i in 0..self.n_rows {
            // Cycle through levels first so every level appears.
            let (variety, category, base) = VARIETIES[if i < VARIETIES.len() {
                i
            } else {
                rng.gen_range(0..VARIETIES.len())
            }];
            let (region, region_effect) = REGIONS[rng.gen_range(0..REGIONS.len())];
            let (grade, grade_effect) = GRADES[rng.gen_range(0..GRADES.len())];

            let q = rng.gen_range(10.0..1000.0);
            let m = rng.gen_range(5.0..95.0);
            let d = rng.gen_range(0.0..30.0);
            let h = base + rng.gen_range(-5.0..5.0);

            let price = 5.0
                + HISTORICAL_PRICE_EFFECT * h
                + MOISTURE_EFFECT * m
                - 0.1 * d
                + 0.001 * q
                + region_effect
                + grade_effect
                + rng.sample(noise);

            categories.push(category);
            varieties.push(variety);
            regions.push(region);
            grades.push(grade);
            quantity.push(q);
            moisture.push(m);
            days.push(d);
            historical.push(h);
            prices.push(price);
        }

        let table = RawTable::new(vec![
            text_column("product_category", &categories),
            text_column("variety", &varieties),
            text_column("market_region", &regions),
            text_column("grade", &grades),
            number_column("quantity_kg", &quantity),
            number_column("moisture_pct", &moisture),
            number_column("days_since_harvest", &days),
            number_column("historical_avg_price", &historical),
            number_column("price_per_kg", &prices),
        ])
        .expect("generated columns have equal heights");

        SyntheticData {
            table,
            prices,
            historical_price_effect: HISTORICAL_PRICE_EFFECT,
            moisture_effect: MOISTURE_EFFECT,
        }
    }
}
