//! Derived display columns and the placeholder prediction stand-in.

use rand::Rng;
use serde_json::{json, Value};

/// Home-minus-away final score, when both totals are present.
pub fn game_margin(record: &Value) -> Option<i64> {
    let home = record["scores"]["home"]["total"].as_i64()?;
    let away = record["scores"]["away"]["total"].as_i64()?;
    Some(home - away)
}

/// Combined final score, when both totals are present.
pub fn game_total(record: &Value) -> Option<i64> {
    let home = record["scores"]["home"]["total"].as_i64()?;
    let away = record["scores"]["away"]["total"].as_i64()?;
    Some(home + away)
}

/// Placeholder model: a uniform random draw, NOT a prediction. Kept as an
/// explicit stand-in until a real model exists.
pub fn placeholder_win_probability(rng: &mut impl Rng) -> f64 {
    rng.gen_range(0.0..1.0)
}

/// Attach derived columns to a dataset's records for display. Records that
/// lack the expected score fields pass through unchanged.
pub fn decorate(dataset: &str, records: &[Value]) -> Vec<Value> {
    let mut rng = rand::thread_rng();
    records
        .iter()
        .map(|record| {
            let mut out = record.clone();
            if let Value::Object(map) = &mut out {
                match dataset {
                    "games" => {
                        if let Some(margin) = game_margin(record) {
                            map.insert("margin".to_string(), json!(margin));
                        }
                        if let Some(total) = game_total(record) {
                            map.insert("total_points".to_string(), json!(total));
                        }
                    }
                    "upcoming_games" => {
                        let p = placeholder_win_probability(&mut rng);
                        map.insert(
                            "home_win_prob".to_string(),
                            json!((p * 1000.0).round() / 1000.0),
                        );
                    }
                    _ => {}
                }
            }
            out
        })
        .collect()
}
