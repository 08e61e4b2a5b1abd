//! Dimensional analysis for dataset fields and metadata.
//!
//! Every scale factor is expressed relative to a fixed reference system
//! (cgs: centimeter, gram, second, gauss). A [`UnitSystem`] additionally
//! carries the dataset's own _code units_, one per [`BaseQuantity`], which
//! can be referred to in unit expressions as `code_length`, `code_mass`,
//! `code_time`, `code_velocity` and `code_magnetic`.

use core::fmt;
use core::convert::TryFrom;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

const NUM_DIMENSIONS: usize = 4;
const DIMENSION_NAMES: [&str; NUM_DIMENSIONS] = ["length", "mass", "time", "magnetic_field"];
const REFERENCE_SYMBOLS: [&str; NUM_DIMENSIONS] = ["cm", "g", "s", "gauss"];




/// The quantities for which a dataset may override its code units.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseQuantity {
    Length,
    Mass,
    Time,
    Velocity,
    MagneticField,
}

impl BaseQuantity {
    pub const ALL: [BaseQuantity; 5] = [
        BaseQuantity::Length,
        BaseQuantity::Mass,
        BaseQuantity::Time,
        BaseQuantity::Velocity,
        BaseQuantity::MagneticField,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BaseQuantity::Length => "length",
            BaseQuantity::Mass => "mass",
            BaseQuantity::Time => "time",
            BaseQuantity::Velocity => "velocity",
            BaseQuantity::MagneticField => "magnetic_field",
        }
    }

    /// The dimension tag of this quantity. Velocity is length per time.
    pub fn dimension(self) -> Dimension {
        match self {
            BaseQuantity::Length => Dimension([1, 0, 0, 0]),
            BaseQuantity::Mass => Dimension([0, 1, 0, 0]),
            BaseQuantity::Time => Dimension([0, 0, 1, 0]),
            BaseQuantity::Velocity => Dimension([1, 0, -1, 0]),
            BaseQuantity::MagneticField => Dimension([0, 0, 0, 1]),
        }
    }

    /// The symbol under which the dataset's code unit for this quantity is
    /// known inside unit expressions.
    pub fn code_symbol(self) -> &'static str {
        match self {
            BaseQuantity::Length => "code_length",
            BaseQuantity::Mass => "code_mass",
            BaseQuantity::Time => "code_time",
            BaseQuantity::Velocity => "code_velocity",
            BaseQuantity::MagneticField => "code_magnetic",
        }
    }

    fn index(self) -> usize {
        match self {
            BaseQuantity::Length => 0,
            BaseQuantity::Mass => 1,
            BaseQuantity::Time => 2,
            BaseQuantity::Velocity => 3,
            BaseQuantity::MagneticField => 4,
        }
    }
}




/**
 * A dimension tag: integer exponents of length, mass, time and magnetic field
 * strength.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dimension([i8; NUM_DIMENSIONS]);




// ============================================================================
impl Dimension {

    pub const DIMENSIONLESS: Dimension = Dimension([0; NUM_DIMENSIONS]);

    pub fn is_dimensionless(&self) -> bool {
        *self == Self::DIMENSIONLESS
    }

    /// Raise to an integer power. Returns `None` if an exponent leaves the
    /// representable range.
    pub fn checked_powi(self, n: i32) -> Option<Self> {
        let mut exponents = self.0;
        for e in exponents.iter_mut() {
            *e = i8::try_from((*e as i32).checked_mul(n)?).ok()?;
        }
        Some(Dimension(exponents))
    }

    pub fn checked_mul(self, other: Dimension) -> Option<Self> {
        let mut exponents = self.0;
        for (e, o) in exponents.iter_mut().zip(other.0.iter()) {
            *e = e.checked_add(*o)?;
        }
        Some(Dimension(exponents))
    }

    pub fn checked_div(self, other: Dimension) -> Option<Self> {
        self.checked_mul(other.checked_powi(-1)?)
    }

    /**
     * Return the symbol of the reference-system unit carrying this dimension,
     * e.g. `cm**-3*g` for a mass density.
     */
    pub fn reference_symbol(&self) -> String {
        self.join(&REFERENCE_SYMBOLS, "1")
    }

    fn join(&self, names: &[&str; NUM_DIMENSIONS], empty: &str) -> String {
        let terms: Vec<_> = self.0
            .iter()
            .zip(names.iter())
            .filter(|(e, _)| **e != 0)
            .map(|(e, name)| if *e == 1 {
                name.to_string()
            } else {
                format!("{}**{}", name, e)
            })
            .collect();

        if terms.is_empty() {
            empty.to_string()
        } else {
            terms.join("*")
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.join(&DIMENSION_NAMES, "dimensionless"))
    }
}




/// Known symbolic units with their scale in the reference system, grouped by
/// the quantity they measure.
///
const UNIT_TABLE: &[(&str, f64, BaseQuantity)] = &[
    ("cm", 1.0, BaseQuantity::Length),
    ("mm", 1e-1, BaseQuantity::Length),
    ("m", 1e2, BaseQuantity::Length),
    ("km", 1e5, BaseQuantity::Length),
    ("au", 1.495978707e13, BaseQuantity::Length),
    ("ly", 9.4607304725808e17, BaseQuantity::Length),
    ("pc", 3.0856775814913673e18, BaseQuantity::Length),
    ("kpc", 3.0856775814913673e21, BaseQuantity::Length),
    ("Mpc", 3.0856775814913673e24, BaseQuantity::Length),
    ("Gpc", 3.0856775814913673e27, BaseQuantity::Length),
    ("g", 1.0, BaseQuantity::Mass),
    ("kg", 1e3, BaseQuantity::Mass),
    ("mp", 1.67262192369e-24, BaseQuantity::Mass),
    ("Msun", 1.98841586e33, BaseQuantity::Mass),
    ("s", 1.0, BaseQuantity::Time),
    ("ms", 1e-3, BaseQuantity::Time),
    ("min", 60.0, BaseQuantity::Time),
    ("hr", 3600.0, BaseQuantity::Time),
    ("day", 86400.0, BaseQuantity::Time),
    ("yr", 31556925.9747, BaseQuantity::Time),
    ("kyr", 31556925.9747e3, BaseQuantity::Time),
    ("Myr", 31556925.9747e6, BaseQuantity::Time),
    ("Gyr", 31556925.9747e9, BaseQuantity::Time),
    ("c", 2.99792458e10, BaseQuantity::Velocity),
    ("gauss", 1.0, BaseQuantity::MagneticField),
    ("G", 1.0, BaseQuantity::MagneticField),
    ("mG", 1e-3, BaseQuantity::MagneticField),
    ("uG", 1e-6, BaseQuantity::MagneticField),
    ("nG", 1e-9, BaseQuantity::MagneticField),
    ("T", 1e4, BaseQuantity::MagneticField),
];

fn lookup_table(symbol: &str) -> Option<(f64, Dimension)> {
    UNIT_TABLE
        .iter()
        .find(|(name, _, _)| *name == symbol)
        .map(|(_, scale, quantity)| (*scale, quantity.dimension()))
}




/**
 * A caller-supplied unit: a symbolic expression, a numeric multiple of a
 * symbolic expression, or a bare number interpreted in the reference system.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitSpec {
    Value(f64),
    Scaled(f64, String),
    Symbol(String),
}

impl From<&str> for UnitSpec {
    fn from(symbol: &str) -> Self {
        UnitSpec::Symbol(symbol.to_string())
    }
}

impl From<String> for UnitSpec {
    fn from(symbol: String) -> Self {
        UnitSpec::Symbol(symbol)
    }
}

impl From<f64> for UnitSpec {
    fn from(value: f64) -> Self {
        UnitSpec::Value(value)
    }
}

impl From<(f64, &str)> for UnitSpec {
    fn from(pair: (f64, &str)) -> Self {
        UnitSpec::Scaled(pair.0, pair.1.to_string())
    }
}

impl Default for UnitSpec {
    fn default() -> Self {
        UnitSpec::Symbol("dimensionless".to_string())
    }
}




/**
 * A resolved unit: a symbol for display, a scale factor to the reference
 * system and a dimension tag.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    symbol: String,
    scale: f64,
    dimension: Dimension,
}




// ============================================================================
impl Unit {

    pub fn new<S: Into<String>>(symbol: S, scale: f64, dimension: Dimension) -> Self {
        Self { symbol: symbol.into(), scale, dimension }
    }

    pub fn dimensionless() -> Self {
        Self::new("dimensionless", 1.0, Dimension::DIMENSIONLESS)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Convert a value expressed in this unit to the reference system.
    pub fn to_reference(&self, value: f64) -> f64 {
        value * self.scale
    }

    /// Convert a value expressed in the reference system to this unit.
    pub fn from_reference(&self, value: f64) -> f64 {
        value / self.scale
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.symbol)
    }
}




/// Per-quantity overrides of a dataset's code units. Quantities left as
/// `None` default to the reference system.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitOverrides {
    pub length: Option<UnitSpec>,
    pub mass: Option<UnitSpec>,
    pub time: Option<UnitSpec>,
    pub velocity: Option<UnitSpec>,
    pub magnetic_field: Option<UnitSpec>,
}

impl UnitOverrides {
    pub fn get(&self, quantity: BaseQuantity) -> Option<&UnitSpec> {
        match quantity {
            BaseQuantity::Length => self.length.as_ref(),
            BaseQuantity::Mass => self.mass.as_ref(),
            BaseQuantity::Time => self.time.as_ref(),
            BaseQuantity::Velocity => self.velocity.as_ref(),
            BaseQuantity::MagneticField => self.magnetic_field.as_ref(),
        }
    }

    pub fn with_length<U: Into<UnitSpec>>(mut self, spec: U) -> Self {
        self.length = Some(spec.into());
        self
    }

    pub fn with_mass<U: Into<UnitSpec>>(mut self, spec: U) -> Self {
        self.mass = Some(spec.into());
        self
    }

    pub fn with_time<U: Into<UnitSpec>>(mut self, spec: U) -> Self {
        self.time = Some(spec.into());
        self
    }

    pub fn with_velocity<U: Into<UnitSpec>>(mut self, spec: U) -> Self {
        self.velocity = Some(spec.into());
        self
    }

    pub fn with_magnetic_field<U: Into<UnitSpec>>(mut self, spec: U) -> Self {
        self.magnetic_field = Some(spec.into());
        self
    }
}




/**
 * The code units of one dataset. Built once at dataset construction and
 * immutable afterwards.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct UnitSystem {
    base: [Unit; 5],
}




// ============================================================================
impl UnitSystem {

    /**
     * The reference system itself: every code unit has scale 1.
     */
    pub fn reference() -> Self {
        let unit = |q: BaseQuantity| Unit::new(q.dimension().reference_symbol(), 1.0, q.dimension());
        Self {
            base: [
                unit(BaseQuantity::Length),
                unit(BaseQuantity::Mass),
                unit(BaseQuantity::Time),
                unit(BaseQuantity::Velocity),
                unit(BaseQuantity::MagneticField),
            ],
        }
    }

    /**
     * Build a unit system from per-quantity overrides. Each override is
     * resolved against the reference system and must carry the dimension of
     * the quantity it overrides.
     */
    pub fn new(overrides: &UnitOverrides) -> Result<Self> {
        let reference = Self::reference();
        let mut base = reference.base.clone();

        for quantity in BaseQuantity::ALL.iter() {
            if let Some(spec) = overrides.get(*quantity) {
                base[quantity.index()] = reference.resolve_as(spec, quantity.name(), quantity.dimension())?;
            }
        }
        Ok(Self { base })
    }

    /// Return the code unit of the given quantity.
    pub fn base(&self, quantity: BaseQuantity) -> &Unit {
        &self.base[quantity.index()]
    }

    /**
     * Resolve a unit spec with no expected dimension. A bare number is taken
     * to be dimensionless.
     */
    pub fn resolve(&self, spec: &UnitSpec) -> Result<Unit> {
        let unit = match spec {
            UnitSpec::Value(value) => Unit::new(value.to_string(), *value, Dimension::DIMENSIONLESS),
            UnitSpec::Scaled(value, symbol) => {
                let (scale, dimension) = self.parse_expression(symbol)?;
                Unit::new(format!("{} {}", value, symbol), value * scale, dimension)
            }
            UnitSpec::Symbol(symbol) => {
                let (scale, dimension) = self.parse_expression(symbol)?;
                Unit::new(symbol.clone(), scale, dimension)
            }
        };
        positive_scale(unit)
    }

    /**
     * Resolve a unit spec for a quantity whose dimension is known. A bare
     * number is taken to be expressed in the reference unit of that
     * dimension. Fails if a symbolic unit has another dimension.
     */
    pub fn resolve_as(&self, spec: &UnitSpec, quantity: &str, expected: Dimension) -> Result<Unit> {
        let unit = match spec {
            UnitSpec::Value(value) => {
                let symbol = format!("{} {}", value, expected.reference_symbol());
                positive_scale(Unit::new(symbol, *value, expected))?
            }
            _ => self.resolve(spec)?,
        };

        if unit.dimension != expected {
            return Err(Error::DimensionMismatch {
                quantity: quantity.to_string(),
                expected,
                found: unit.dimension,
            });
        }
        Ok(unit)
    }

    fn lookup_symbol(&self, symbol: &str) -> Result<(f64, Dimension)> {
        if let Some(quantity) = BaseQuantity::ALL.iter().find(|q| q.code_symbol() == symbol) {
            let unit = self.base(*quantity);
            return Ok((unit.scale, unit.dimension));
        }
        if symbol == "dimensionless" || symbol == "1" {
            return Ok((1.0, Dimension::DIMENSIONLESS));
        }
        lookup_table(symbol).ok_or_else(|| Error::UnknownUnit(symbol.to_string()))
    }

    /**
     * Parse a product of powers of known symbols, such as `g/cm**3`,
     * `Msun*kpc^-3` or `code_length/code_time`.
     */
    fn parse_expression(&self, expression: &str) -> Result<(f64, Dimension)> {
        let expression = expression.trim().replace("**", "^");

        if expression.is_empty() {
            return Err(Error::UnknownUnit(expression));
        }

        let mut scale = 1.0;
        let mut dimension = Dimension::DIMENSIONLESS;
        let mut sign = 1;
        let mut term = String::new();

        for c in expression.chars().chain(core::iter::once('*')) {
            match c {
                '*' | '/' => {
                    let (s, d) = self.parse_term(&term, &expression)?;
                    scale *= s.powi(sign);
                    dimension = d
                        .checked_powi(sign)
                        .and_then(|d| dimension.checked_mul(d))
                        .ok_or_else(|| exponent_out_of_range(&expression))?;
                    sign = if c == '/' { -1 } else { 1 };
                    term.clear();
                }
                c if c.is_whitespace() => {}
                c => term.push(c),
            }
        }
        Ok((scale, dimension))
    }

    fn parse_term(&self, term: &str, expression: &str) -> Result<(f64, Dimension)> {
        if term.is_empty() {
            return Err(Error::UnknownUnit(expression.to_string()));
        }
        let mut parts = term.splitn(2, '^');
        let symbol = parts.next().unwrap_or_default();
        let power = match parts.next() {
            Some(p) => p.parse::<i32>().map_err(|_| Error::UnknownUnit(expression.to_string()))?,
            None => 1,
        };
        let (scale, dimension) = self.lookup_symbol(symbol)?;
        let dimension = dimension.checked_powi(power).ok_or_else(|| exponent_out_of_range(expression))?;
        Ok((scale.powi(power), dimension))
    }
}

impl Default for UnitSystem {
    fn default() -> Self {
        Self::reference()
    }
}




fn exponent_out_of_range(expression: &str) -> Error {
    Error::config(format!("unit '{}' has a dimension exponent out of range", expression))
}

/**
 * Fail unless the unit's scale is a finite, positive number. Anything else
 * cannot be converted to and from the reference system.
 */
fn positive_scale(unit: Unit) -> Result<Unit> {
    if unit.scale.is_finite() && unit.scale > 0.0 {
        Ok(unit)
    } else {
        Err(Error::config(format!(
            "unit '{}' has scale {}; a unit scale must be finite and positive",
            unit.symbol,
            unit.scale)))
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::error::ErrorKind;

    const MSUN: f64 = 1.98841586e33;
    const KPC: f64 = 3.0856775814913673e21;

    #[test]
    fn scaled_unit_converts_back_to_reference_exactly() {
        let units = UnitSystem::reference();
        let unit = units.resolve(&(1.0e14, "Msun").into()).unwrap();
        assert_eq!(unit.dimension(), BaseQuantity::Mass.dimension());
        assert_eq!(unit.to_reference(2.0), 2.0e14 * MSUN);
    }

    #[test]
    fn unknown_symbols_are_rejected() {
        let units = UnitSystem::reference();
        let err = units.resolve(&"furlong".into()).unwrap_err();
        assert!(matches!(err, Error::UnknownUnit(ref s) if s == "furlong"));
        assert_eq!(err.kind(), ErrorKind::UnitResolution);
        assert!(units.resolve(&"g/".into()).is_err());
        assert!(units.resolve(&"cm**x".into()).is_err());
    }

    #[test]
    fn overriding_a_quantity_with_the_wrong_dimension_fails() {
        let overrides = UnitOverrides::default().with_length("Myr");
        match UnitSystem::new(&overrides) {
            Err(Error::DimensionMismatch { quantity, expected, found }) => {
                assert_eq!(quantity, "length");
                assert_eq!(expected, BaseQuantity::Length.dimension());
                assert_eq!(found, BaseQuantity::Time.dimension());
            }
            other => panic!("expected a dimension mismatch, got {:?}", other),
        }
    }

    #[test]
    fn compound_expressions_resolve_scale_and_dimension() {
        let units = UnitSystem::reference();
        let density = units.resolve(&"Msun/kpc**3".into()).unwrap();
        let expected = BaseQuantity::Mass.dimension().checked_div(BaseQuantity::Length.dimension().checked_powi(3).unwrap()).unwrap();
        assert_eq!(density.dimension(), expected);
        assert!((density.scale() - MSUN / KPC.powi(3)).abs() <= 1e-12 * density.scale());

        let speed = units.resolve(&"km/s".into()).unwrap();
        assert_eq!(speed.dimension(), BaseQuantity::Velocity.dimension());
        assert_eq!(speed.scale(), 1e5);

        let same = units.resolve(&"km * s^-1".into()).unwrap();
        assert_eq!(same.scale(), speed.scale());
        assert_eq!(same.dimension(), speed.dimension());
    }

    #[test]
    fn code_units_follow_the_overrides() {
        let overrides = UnitOverrides::default()
            .with_length("kpc")
            .with_mass((1.0e10, "Msun"))
            .with_time(3.15e13);
        let units = UnitSystem::new(&overrides).unwrap();

        assert_eq!(units.base(BaseQuantity::Length).scale(), KPC);
        assert_eq!(units.base(BaseQuantity::Mass).scale(), 1.0e10 * MSUN);
        assert_eq!(units.base(BaseQuantity::Time).scale(), 3.15e13);
        assert_eq!(units.base(BaseQuantity::Velocity).scale(), 1.0);

        let density = units.resolve(&"code_mass/code_length**3".into()).unwrap();
        assert!((density.scale() - 1.0e10 * MSUN / KPC.powi(3)).abs() <= 1e-12 * density.scale());
    }

    #[test]
    fn bare_numbers_take_the_expected_dimension() {
        let units = UnitSystem::reference();
        let field = Dimension::DIMENSIONLESS;
        assert!(units.resolve(&2.0.into()).unwrap().dimension().is_dimensionless());

        let speed = units.resolve_as(&2.0.into(), "velocity", BaseQuantity::Velocity.dimension()).unwrap();
        assert_eq!(speed.scale(), 2.0);
        assert_eq!(speed.symbol(), "2 cm*s**-1");
        assert_ne!(speed.dimension(), field);
    }

    #[test]
    fn exponents_out_of_range_are_rejected() {
        let units = UnitSystem::reference();
        for expression in &["cm^100*cm^100", "cm^200", "cm**-200", "g^64/g^-64"] {
            let err = units.resolve(&(*expression).into()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{}", expression);
        }
        assert_eq!(units.resolve(&"cm^100/cm^100".into()).unwrap().dimension(), Dimension::DIMENSIONLESS);
        assert_eq!(Dimension::DIMENSIONLESS.checked_powi(i32::MAX), Some(Dimension::DIMENSIONLESS));
        assert_eq!(BaseQuantity::Length.dimension().checked_powi(128), None);
    }

    #[test]
    fn non_positive_or_non_finite_scales_are_rejected() {
        for scale in &[0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = UnitSystem::new(&UnitOverrides::default().with_length(*scale)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
            let err = UnitSystem::new(&UnitOverrides::default().with_mass((*scale, "Msun"))).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }
        let units = UnitSystem::reference();
        assert_eq!(units.resolve(&0.0.into()).unwrap_err().kind(), ErrorKind::Configuration);
        assert_eq!(units.resolve(&"pc^100".into()).unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn unit_specs_deserialize_from_any_of_their_forms() {
        let specs: Vec<UnitSpec> = serde_json::from_str(r#"["Msun", [1e14, "Msun"], 3.0]"#).unwrap();
        assert_eq!(specs[0], UnitSpec::Symbol("Msun".to_string()));
        assert_eq!(specs[1], UnitSpec::Scaled(1e14, "Msun".to_string()));
        assert_eq!(specs[2], UnitSpec::Value(3.0));
    }

    #[test]
    fn dimensions_display_by_name() {
        let density = BaseQuantity::Mass.dimension().checked_div(BaseQuantity::Length.dimension().checked_powi(3).unwrap()).unwrap();
        assert_eq!(density.to_string(), "length**-3*mass");
        assert_eq!(density.reference_symbol(), "cm**-3*g");
        assert_eq!(Dimension::DIMENSIONLESS.to_string(), "dimensionless");
    }
}
