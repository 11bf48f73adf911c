//! Interpolators
//!
//! Map a driving number into an output value:
//! - [`Interpolator::range`]: piecewise-linear over `range -> output`
//! - [`Interpolator::from_config`]: with easing, pre-map, and extrapolation
//! - [`Interpolator::strings`]: numbers (and colors) embedded in strings
//! - [`Interpolator::from_fn`]: any function
//!
//! # Example
//!
//! ```ignore
//! use kinetic_animation::{Extrapolate, Interpolator, InterpolatorConfig};
//!
//! let opacity = Interpolator::from_config(
//!     InterpolatorConfig::new(vec![0.0, 100.0], vec![1.0, 0.0]).extrapolate(Extrapolate::Clamp),
//! )?;
//! let fill = Interpolator::strings(&["#f00", "rgba(0, 0, 255, 0.5)"])?;
//! ```

use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

use kinetic_core::{format_number, named_color_keywords, Color, Value};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::easing::Easing;
use crate::error::{AnimationError, Result};

/// Behavior for inputs outside the interpolation range
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extrapolate {
    /// Continue the slope of the nearest segment
    #[default]
    Extend,
    /// Pin to the nearest endpoint
    Clamp,
    /// Return the input unchanged
    Identity,
}

/// Output stops of an interpolation
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    Numbers(Vec<f64>),
    Strings(Vec<String>),
}

impl Output {
    fn len(&self) -> usize {
        match self {
            Output::Numbers(values) => values.len(),
            Output::Strings(values) => values.len(),
        }
    }
}

impl From<Vec<f64>> for Output {
    fn from(values: Vec<f64>) -> Self {
        Output::Numbers(values)
    }
}

impl From<Vec<String>> for Output {
    fn from(values: Vec<String>) -> Self {
        Output::Strings(values)
    }
}

impl From<Vec<&str>> for Output {
    fn from(values: Vec<&str>) -> Self {
        Output::Strings(values.into_iter().map(String::from).collect())
    }
}

/// Full interpolation description
#[derive(Clone)]
pub struct InterpolatorConfig {
    pub range: Vec<f64>,
    pub output: Output,
    pub extrapolate: Extrapolate,
    pub extrapolate_left: Option<Extrapolate>,
    pub extrapolate_right: Option<Extrapolate>,
    pub easing: Easing,
    /// Applied to the input before range lookup
    pub map: Option<Rc<dyn Fn(f64) -> f64>>,
}

impl InterpolatorConfig {
    pub fn new(range: Vec<f64>, output: impl Into<Output>) -> Self {
        Self {
            range,
            output: output.into(),
            extrapolate: Extrapolate::Extend,
            extrapolate_left: None,
            extrapolate_right: None,
            easing: Easing::Linear,
            map: None,
        }
    }

    pub fn extrapolate(mut self, extrapolate: Extrapolate) -> Self {
        self.extrapolate = extrapolate;
        self
    }

    pub fn extrapolate_left(mut self, extrapolate: Extrapolate) -> Self {
        self.extrapolate_left = Some(extrapolate);
        self
    }

    pub fn extrapolate_right(mut self, extrapolate: Extrapolate) -> Self {
        self.extrapolate_right = Some(extrapolate);
        self
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn map(mut self, map: impl Fn(f64) -> f64 + 'static) -> Self {
        self.map = Some(Rc::new(map));
        self
    }

    fn validate(&self) -> Result<()> {
        if self.range.len() < 2 {
            return Err(AnimationError::InvalidInterpolation(format!(
                "range needs at least 2 stops, got {}",
                self.range.len()
            )));
        }
        if self.range.len() != self.output.len() {
            return Err(AnimationError::InvalidInterpolation(format!(
                "range has {} stops but output has {}",
                self.range.len(),
                self.output.len()
            )));
        }
        if self.range.iter().any(|x| x.is_nan()) {
            return Err(AnimationError::InvalidInterpolation(
                "range contains NaN".to_string(),
            ));
        }
        if self.range.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(AnimationError::InvalidInterpolation(format!(
                "range must be ascending: {:?}",
                self.range
            )));
        }
        Ok(())
    }

    fn scalar(&self, output: Vec<f64>) -> RangeInterpolator {
        RangeInterpolator {
            range: self.range.clone(),
            output,
            left: self.extrapolate_left.unwrap_or(self.extrapolate),
            right: self.extrapolate_right.unwrap_or(self.extrapolate),
            easing: self.easing,
            map: self.map.clone(),
        }
    }
}

// ============================================================================
// Numeric ranges
// ============================================================================

/// Piecewise-linear numeric mapping
#[derive(Clone)]
pub struct RangeInterpolator {
    range: Vec<f64>,
    output: Vec<f64>,
    left: Extrapolate,
    right: Extrapolate,
    easing: Easing,
    map: Option<Rc<dyn Fn(f64) -> f64>>,
}

impl RangeInterpolator {
    pub fn apply(&self, input: f64) -> f64 {
        let i = find_range(input, &self.range);
        self.segment(
            input,
            self.range[i],
            self.range[i + 1],
            self.output[i],
            self.output[i + 1],
        )
    }

    fn segment(&self, input: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
        let mut result = match &self.map {
            Some(map) => map(input),
            None => input,
        };

        if result < in_min {
            match self.left {
                Extrapolate::Identity => return result,
                Extrapolate::Clamp => result = in_min,
                Extrapolate::Extend => {}
            }
        }
        if result > in_max {
            match self.right {
                Extrapolate::Identity => return result,
                Extrapolate::Clamp => result = in_max,
                Extrapolate::Extend => {}
            }
        }

        if out_min == out_max {
            return out_min;
        }
        if in_min == in_max {
            return if input <= in_min { out_min } else { out_max };
        }

        // Infinite endpoints keep the distance from the finite end
        result = if in_min == f64::NEG_INFINITY {
            -result
        } else if in_max == f64::INFINITY {
            result - in_min
        } else {
            (result - in_min) / (in_max - in_min)
        };

        result = self.easing.apply(result);

        if out_min == f64::NEG_INFINITY {
            -result
        } else if out_max == f64::INFINITY {
            result + out_min
        } else {
            result * (out_max - out_min) + out_min
        }
    }
}

/// Index of the segment containing `input`; the first or last when out of bounds
fn find_range(input: f64, range: &[f64]) -> usize {
    let mut i = 1;
    while i < range.len() - 1 {
        if range[i] >= input {
            break;
        }
        i += 1;
    }
    i - 1
}

// ============================================================================
// Strings
// ============================================================================

fn number_regex() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| {
        Regex::new(r"[+\-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+\-]?\d+)?").expect("Invalid number regex")
    })
}

fn color_regex() -> &'static Regex {
    static COLOR: OnceLock<Regex> = OnceLock::new();
    COLOR.get_or_init(|| {
        let names: Vec<&str> = named_color_keywords().collect();
        let pattern = format!(
            r"(?i)#(?:[0-9a-f]{{8}}|[0-9a-f]{{6}}|[0-9a-f]{{3,4}})\b|(?:rgba?|hsla?)\([^)]*\)|\b(?:{})\b",
            names.join("|")
        );
        Regex::new(&pattern).expect("Invalid color regex")
    })
}

fn rgba_regex() -> &'static Regex {
    static RGBA: OnceLock<Regex> = OnceLock::new();
    RGBA.get_or_init(|| {
        Regex::new(r"rgba\(([^,]+),([^,]+),([^,]+),([^)]+)\)").expect("Invalid rgba regex")
    })
}

/// Replace every color token in `input` with its `rgba(r,g,b,a)` form
pub fn normalize_colors(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for token in color_regex().find_iter(input) {
        out.push_str(&input[last..token.start()]);
        out.push_str(&Color::parse(token.as_str())?.to_css());
        last = token.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

fn round_rgba(caps: &Captures<'_>) -> String {
    let channel = |i: usize| {
        caps[i]
            .trim()
            .parse::<f64>()
            .map(|v| format_number(v.round().clamp(0.0, 255.0)))
            .unwrap_or_else(|_| caps[i].to_string())
    };
    let alpha = caps[4]
        .trim()
        .parse::<f64>()
        .map(|a| format_number((a.clamp(0.0, 1.0) * 1000.0).round() / 1000.0))
        .unwrap_or_else(|_| caps[4].to_string());
    format!("rgba({},{},{},{})", channel(1), channel(2), channel(3), alpha)
}

/// Interpolates the numbers embedded in a set of template strings
///
/// Every output string must contain the same count of numbers once colors
/// are normalized. Static text comes from the first output.
#[derive(Clone)]
pub struct StringInterpolator {
    segments: Vec<String>,
    slots: Vec<RangeInterpolator>,
}

impl StringInterpolator {
    pub fn new(config: &InterpolatorConfig) -> Result<Self> {
        config.validate()?;
        let outputs = match &config.output {
            Output::Strings(outputs) => outputs,
            Output::Numbers(_) => {
                return Err(AnimationError::InvalidInterpolation(
                    "string interpolator needs string outputs".to_string(),
                ))
            }
        };

        let normalized = outputs
            .iter()
            .map(|s| normalize_colors(s))
            .collect::<Result<Vec<_>>>()?;

        let numbers: Vec<Vec<f64>> = normalized
            .iter()
            .map(|s| {
                number_regex()
                    .find_iter(s)
                    .filter_map(|m| m.as_str().parse::<f64>().ok())
                    .collect()
            })
            .collect();

        let count = numbers[0].len();
        if let Some((i, _)) = numbers.iter().enumerate().find(|(_, n)| n.len() != count) {
            return Err(AnimationError::InvalidInterpolation(format!(
                "'{}' has {} numbers but '{}' has {}",
                outputs[0],
                count,
                outputs[i],
                numbers[i].len()
            )));
        }

        let segments = number_regex()
            .split(&normalized[0])
            .map(String::from)
            .collect();

        let slots = (0..count)
            .map(|slot| config.scalar(numbers.iter().map(|n| n[slot]).collect()))
            .collect();

        Ok(Self { segments, slots })
    }

    pub fn apply(&self, input: f64) -> String {
        let mut out = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            out.push_str(segment);
            if let Some(slot) = self.slots.get(i) {
                out.push_str(&format_number(slot.apply(input)));
            }
        }
        rgba_regex().replace_all(&out, round_rgba).into_owned()
    }
}

// ============================================================================
// Interpolator
// ============================================================================

/// A mapping from a driving number to an output value
#[derive(Clone)]
pub enum Interpolator {
    Range(RangeInterpolator),
    Strings(StringInterpolator),
    Custom(Rc<dyn Fn(f64) -> Value>),
}

impl Interpolator {
    /// Piecewise-linear numeric mapping with extended extrapolation
    pub fn range(range: Vec<f64>, output: Vec<f64>) -> Result<Self> {
        Self::from_config(InterpolatorConfig::new(range, output))
    }

    pub fn from_config(config: InterpolatorConfig) -> Result<Self> {
        config.validate()?;
        match &config.output {
            Output::Numbers(output) => Ok(Interpolator::Range(config.scalar(output.clone()))),
            Output::Strings(_) => Ok(Interpolator::Strings(StringInterpolator::new(&config)?)),
        }
    }

    /// String outputs spread evenly over `0..=1`
    pub fn strings<S: AsRef<str>>(outputs: &[S]) -> Result<Self> {
        let n = outputs.len();
        let range = (0..n)
            .map(|i| if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 })
            .collect();
        let outputs: Vec<String> = outputs.iter().map(|s| s.as_ref().to_string()).collect();
        Self::from_config(InterpolatorConfig::new(range, outputs))
    }

    pub fn from_fn(f: impl Fn(f64) -> Value + 'static) -> Self {
        Interpolator::Custom(Rc::new(f))
    }

    pub fn interpolate(&self, input: f64) -> Value {
        match self {
            Interpolator::Range(range) => Value::Number(range.apply(input)),
            Interpolator::Strings(strings) => Value::Text(strings.apply(input)),
            Interpolator::Custom(f) => f(input),
        }
    }
}

impl fmt::Debug for Interpolator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpolator::Range(range) => f
                .debug_struct("Range")
                .field("range", &range.range)
                .field("output", &range.output)
                .finish(),
            Interpolator::Strings(strings) => f
                .debug_struct("Strings")
                .field("segments", &strings.segments)
                .field("slots", &strings.slots.len())
                .finish(),
            Interpolator::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(interp: &Interpolator, x: f64) -> f64 {
        interp.interpolate(x).as_number().unwrap()
    }

    fn text(interp: &Interpolator, x: f64) -> String {
        interp.interpolate(x).as_text().unwrap().to_string()
    }

    #[test]
    fn test_range_mapping() {
        let interp = Interpolator::range(vec![0.0, 0.5, 1.0], vec![0.0, 100.0, 0.0]).unwrap();
        assert_eq!(number(&interp, 0.25), 50.0);
        assert_eq!(number(&interp, 0.5), 100.0);
        assert_eq!(number(&interp, 0.75), 50.0);
    }

    #[test]
    fn test_extrapolate_clamp() {
        let interp = Interpolator::from_config(
            InterpolatorConfig::new(vec![0.0, 1.0], vec![10.0, 20.0])
                .extrapolate(Extrapolate::Clamp),
        )
        .unwrap();
        assert_eq!(number(&interp, 100.0), 20.0);
        assert_eq!(number(&interp, -5.0), 10.0);
    }

    #[test]
    fn test_extrapolate_extend_and_identity() {
        let extend = Interpolator::range(vec![0.0, 1.0], vec![10.0, 20.0]).unwrap();
        assert_eq!(number(&extend, 2.0), 30.0);
        assert_eq!(number(&extend, -1.0), 0.0);

        let mixed = Interpolator::from_config(
            InterpolatorConfig::new(vec![0.0, 1.0], vec![10.0, 20.0])
                .extrapolate_left(Extrapolate::Identity)
                .extrapolate_right(Extrapolate::Clamp),
        )
        .unwrap();
        assert_eq!(number(&mixed, -7.0), -7.0);
        assert_eq!(number(&mixed, 7.0), 20.0);
    }

    #[test]
    fn test_easing_and_map() {
        let interp = Interpolator::from_config(
            InterpolatorConfig::new(vec![0.0, 1.0], vec![0.0, 100.0])
                .easing(Easing::EaseInQuad)
                .map(|x| x / 2.0),
        )
        .unwrap();
        assert_eq!(number(&interp, 1.0), 25.0);
    }

    #[test]
    fn test_infinite_endpoints() {
        let interp =
            Interpolator::range(vec![0.0, f64::INFINITY], vec![0.0, f64::INFINITY]).unwrap();
        assert_eq!(number(&interp, 42.0), 42.0);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            Interpolator::range(vec![0.0], vec![1.0]),
            Err(AnimationError::InvalidInterpolation(_))
        ));
        assert!(Interpolator::range(vec![0.0, 1.0], vec![1.0, 2.0, 3.0]).is_err());
        assert!(Interpolator::range(vec![1.0, 0.0], vec![1.0, 2.0]).is_err());
        assert!(Interpolator::strings(&["1px 2px", "3px"]).is_err());
        assert!(matches!(
            Interpolator::strings(&["rgb(1, 2)", "red"]),
            Err(AnimationError::Color(_))
        ));
    }

    #[test]
    fn test_rgba_midpoint() {
        let interp = Interpolator::strings(&["rgba(0,0,0,1)", "rgba(255,255,255,1)"]).unwrap();
        assert_eq!(text(&interp, 0.5), "rgba(128,128,128,1)");
    }

    #[test]
    fn test_mixed_color_notations() {
        let interp = Interpolator::strings(&["#ff0000", "blue"]).unwrap();
        assert_eq!(text(&interp, 0.0), "rgba(255,0,0,1)");
        assert_eq!(text(&interp, 0.5), "rgba(128,0,128,1)");
        assert_eq!(text(&interp, 1.0), "rgba(0,0,255,1)");
    }

    #[test]
    fn test_templated_strings() {
        let interp = Interpolator::strings(&[
            "translate(0px, -10px) scale(1)",
            "translate(100px, 10px) scale(2)",
        ])
        .unwrap();
        assert_eq!(text(&interp, 0.5), "translate(50px, 0px) scale(1.5)");

        let shadow = Interpolator::strings(&["0px 0px 4px #000", "0px 2px 8px rgba(0, 0, 0, 0.5)"])
            .unwrap();
        assert_eq!(text(&shadow, 1.0), "0px 2px 8px rgba(0,0,0,0.5)");
    }

    #[test]
    fn test_custom_function() {
        let interp = Interpolator::from_fn(|x| Value::from(format!("{x}deg")));
        assert_eq!(interp.interpolate(45.0), Value::from("45deg"));
    }
}
