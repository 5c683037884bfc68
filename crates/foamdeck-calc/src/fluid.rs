//! Brine density and viscosity correlations

use serde::Serialize;

/// Density of the dissolved salt end member, kg/m³
const SALT_DENSITY: f64 = 1695.0;

/// Temperature above which viscosity mixes linearly, °C
const BLEND_LIMIT: f64 = 800.0;

/// Correlation coefficients
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FluidProperties {
    pub c0: f64,
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
    /// Linear pressure coefficient
    pub a: f64,
    /// Quadratic pressure coefficient
    pub b: f64,
    /// Salt viscosity at the blend limit, Pa·s
    pub mu_c_800: f64,
    /// Pure water viscosity, Pa·s
    pub mu_w_base: f64,
}

impl Default for FluidProperties {
    fn default() -> Self {
        Self {
            c0: 999.842594,
            c1: 0.06793952,
            c2: -0.00909529,
            c3: 0.0001001685,
            a: 0.0004831439,
            b: 0.000001617e-05,
            mu_c_800: 2.0,
            mu_w_base: 0.00089,
        }
    }
}

impl FluidProperties {
    /// Pure water density at `t` °C and `p` bar
    pub fn water_density(&self, t: f64, p: f64) -> f64 {
        let rho_0 = self.c0 + self.c1 * t + self.c2 * t.powi(2) + self.c3 * t.powi(3);
        rho_0 + self.a * p + self.b * p.powi(2)
    }

    /// Brine density for salt mass fraction `x`
    pub fn brine_density(&self, t: f64, p: f64, x: f64) -> f64 {
        let rho_w = self.water_density(t, p);
        rho_w + x * (SALT_DENSITY - rho_w)
    }

    /// Brine viscosity in Pa·s; pressure does not enter the correlation
    pub fn brine_viscosity(&self, t: f64, _p: f64, x: f64) -> f64 {
        let mixed = self.mu_w_base * (1.0 - x) + self.mu_c_800 * x;
        if t >= BLEND_LIMIT {
            return mixed;
        }

        let cold = ((BLEND_LIMIT - t) / BLEND_LIMIT).powi(9);
        let hot = (t / BLEND_LIMIT).powi(9);
        (self.mu_w_base * (1.0 + 3.0 * x) * cold + hot * mixed) / (cold + hot)
    }

    pub fn evaluate(&self, state: FluidState) -> BrineProperties {
        let (t, p, x) = (
            state.temperature_c,
            state.pressure_bar(),
            state.mass_fraction(),
        );
        BrineProperties {
            temperature_c: t,
            pressure_bar: p,
            mass_fraction: x,
            density_kg_m3: self.brine_density(t, p, x),
            viscosity_mpa_s: self.brine_viscosity(t, p, x) * 1000.0,
        }
    }
}

/// Operating point as entered by the user
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FluidState {
    pub temperature_c: f64,
    pub pressure_mpa: f64,
    pub salinity_mg_l: f64,
}

impl FluidState {
    pub fn pressure_bar(&self) -> f64 {
        self.pressure_mpa * 10.0
    }

    pub fn mass_fraction(&self) -> f64 {
        self.salinity_mg_l / 1e6
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BrineProperties {
    pub temperature_c: f64,
    pub pressure_bar: f64,
    pub mass_fraction: f64,
    pub density_kg_m3: f64,
    pub viscosity_mpa_s: f64,
}
