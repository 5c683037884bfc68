//! Boundary layer sizing for an impinging-jet mesh
//!
//! Three layers are graded between the nozzle and the wall: a nozzle layer
//! along the jet axis, a uniform wall layer, and a transition layer above it

use serde::Serialize;

use crate::{LayerError, LayerResult};

/// Geometry and first-cell heights
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerInputs {
    /// Nozzle diameter
    pub d: f64,
    /// Nozzle-to-wall distance in diameters
    pub n: f64,
    /// Transition-to-wall distance in diameters
    pub m: f64,
    /// First cell height at the nozzle
    pub dy_in_0: f64,
    /// First cell height at the wall
    pub dy_wall_0: f64,
}

impl Default for LayerInputs {
    fn default() -> Self {
        Self {
            d: 0.106,
            n: 30.0,
            m: 10.0,
            dy_in_0: 0.00142,
            dy_wall_0: 0.008,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LayerRateResult {
    pub rate_nozzle: f64,
    pub rate_wall: f64,
    pub rate_trans: f64,
    pub nozzle_layer_cells: i64,
    pub transition_layer_cells: i64,
    pub wall_layer_cells: i64,
    #[serde(rename = "S_in")]
    pub s_in: f64,
    #[serde(rename = "S_trans")]
    pub s_trans: f64,
}

/// Growth ratio `r` and (fractional) cell count `N` of a geometric layer of
/// height `h` whose cells grow from `y_min` to `y_max`
pub fn compute_rn(y_min: f64, y_max: f64, h: f64) -> LayerResult<(f64, f64)> {
    if y_min == 0.0 {
        return Err(LayerError::DivisionByZero { what: "y_max / y_min" });
    }
    let ss = y_max / y_min;

    // Exact comparison, no tolerance
    let denominator = y_min * ss - h;
    if denominator == 0.0 {
        return Err(LayerError::DivisionByZero {
            what: "y_min * SS - h",
        });
    }
    let r = (y_min - h) / denominator;

    let ln_ss_r = ln(ss * r, "SS * r")?;
    let ln_r = ln(r, "r")?;
    if ln_r == 0.0 {
        return Err(LayerError::DivisionByZero { what: "ln(r)" });
    }

    Ok((r, ln_ss_r / ln_r))
}

/// Growth rates and cell counts for the nozzle, wall and transition layers
pub fn compute_increase_rate(inputs: LayerInputs) -> LayerResult<LayerRateResult> {
    let LayerInputs {
        d,
        n,
        m,
        dy_in_0,
        dy_wall_0,
    } = inputs;

    let delta = m * d;
    let h = n * d;
    // Last nozzle cell matches the first wall cell
    let dy_in_1 = dy_wall_0;
    let dy_trans_1 = h / 50.0;

    let (_, n_in) = compute_rn(dy_in_0, dy_wall_0, 10.0 * d)?;
    let nozzle_layer_cells = truncate(n_in, "nozzle layer cell count")?;

    let (_, n_trans) = compute_rn(dy_wall_0, dy_trans_1, delta)?;
    let transition_layer_cells = truncate(n_trans, "transition layer cell count")?;

    if dy_wall_0 == 0.0 {
        return Err(LayerError::DivisionByZero {
            what: "delta / dy_wall_0",
        });
    }
    let wall_layer_cells = truncate(delta / dy_wall_0, "wall layer cell count")?;

    let s_in = dy_in_1 / dy_in_0;
    let rate_nozzle = growth_rate(s_in, nozzle_layer_cells, "nozzle layer rate")?;

    let s_trans = dy_trans_1 / dy_wall_0;
    let rate_trans = growth_rate(s_trans, transition_layer_cells, "transition layer rate")?;

    Ok(LayerRateResult {
        rate_nozzle,
        rate_wall: 1.0,
        rate_trans,
        nozzle_layer_cells,
        transition_layer_cells,
        wall_layer_cells,
        s_in,
        s_trans,
    })
}

fn ln(value: f64, what: &'static str) -> LayerResult<f64> {
    if value > 0.0 {
        Ok(value.ln())
    } else {
        Err(LayerError::Domain { what, value })
    }
}

/// Truncate toward zero, rejecting NaN and infinities
fn truncate(value: f64, what: &'static str) -> LayerResult<i64> {
    if value.is_finite() {
        Ok(value.trunc() as i64)
    } else {
        Err(LayerError::NonFinite { what, value })
    }
}

/// `ratio ^ (1 / (cells - 1))`
fn growth_rate(ratio: f64, cells: i64, what: &'static str) -> LayerResult<f64> {
    let intervals = cells - 1;
    if intervals == 0 {
        return Err(LayerError::DivisionByZero { what });
    }

    let rate = ratio.powf(1.0 / intervals as f64);
    if rate.is_finite() {
        Ok(rate)
    } else {
        Err(LayerError::NonFinite { what, value: rate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs())
    }

    #[test]
    fn test_reference_case() {
        let result = compute_increase_rate(LayerInputs::default()).unwrap();

        assert_eq!(result.wall_layer_cells, ((10.0 * 0.106) / 0.008) as i64);
        assert_eq!(result.wall_layer_cells, 132);
        assert_eq!(result.rate_wall, 1.0);
        assert_eq!(result.nozzle_layer_cells, 278);
        assert_eq!(result.transition_layer_cells, 39);
        assert!(close(result.rate_nozzle, 1.0062606161356853));
        assert!(close(result.rate_trans, 1.0560728356062705));
        assert!(close(result.s_in, 5.633802816901408));
        assert!(close(result.s_trans, 7.95));
    }

    #[test]
    fn test_compute_rn_reference() {
        let (r, n) = compute_rn(0.00142, 0.008, 1.06).unwrap();
        assert!(close(r, 1.006254752851711));
        assert!(close(n, 278.2588546732174));

        let (r, n) = compute_rn(2.0, 1.0, 0.5).unwrap();
        assert!(close(r, 3.0));
        assert!(close(n, 0.3690702464285425));
    }

    #[test]
    fn test_compute_rn_indeterminate_is_error() {
        // SS = 1, r = 1: ln(1) / ln(1)
        assert_eq!(
            compute_rn(1.0, 1.0, 0.5),
            Err(LayerError::DivisionByZero { what: "ln(r)" })
        );
    }

    #[test]
    fn test_compute_rn_exact_zero_denominator() {
        assert_eq!(
            compute_rn(0.5, 1.0, 1.0),
            Err(LayerError::DivisionByZero {
                what: "y_min * SS - h"
            })
        );
    }

    #[test]
    fn test_compute_rn_log_domain() {
        // r = (1 - 1.5) / (2 - 1.5) = -1
        assert!(matches!(
            compute_rn(1.0, 2.0, 1.5),
            Err(LayerError::Domain { .. })
        ));
    }

    #[test]
    fn test_single_nozzle_cell_is_division_by_zero() {
        let inputs = LayerInputs {
            d: 0.1,
            n: 30.0,
            m: 10.0,
            dy_in_0: 0.5,
            dy_wall_0: 0.8,
        };
        assert_eq!(
            compute_increase_rate(inputs),
            Err(LayerError::DivisionByZero {
                what: "nozzle layer rate"
            })
        );
    }

    #[test]
    fn test_zero_wall_cell_height_fails() {
        let inputs = LayerInputs {
            dy_wall_0: 0.0,
            ..LayerInputs::default()
        };
        assert!(compute_increase_rate(inputs).is_err());
    }

    #[test]
    fn test_result_json_uses_ratio_names() {
        let result = compute_increase_rate(LayerInputs::default()).unwrap();
        let json = serde_json::to_value(result).unwrap();
        assert!(json.get("S_in").is_some());
        assert_eq!(json["wall_layer_cells"], 132);
    }
}
