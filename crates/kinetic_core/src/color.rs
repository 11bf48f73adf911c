//! RGBA colors and the CSS color grammar
//!
//! Supported notations:
//! - hex: `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`
//! - `rgb()` / `rgba()` with comma or space separators and percentages
//! - `hsl()` / `hsla()` with optional `deg` hue units
//! - CSS named colors and `transparent`
//!
//! Colors are stored as normalized `f32` channels and reserialized as
//! `rgba(r,g,b,a)` with 0-255 integer channels.

use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, map, opt, value},
    error::{ErrorKind, ParseError as NomParseError},
    number::complete::float,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use crate::error::ColorParseError;

/// An RGBA color with channels in `0.0..=1.0`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Build from 8-bit channels
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::rgba(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    /// Build from a `0xRRGGBB` literal
    pub fn from_hex(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xFF) as f32 / 255.0;
        let g = ((hex >> 8) & 0xFF) as f32 / 255.0;
        let b = (hex & 0xFF) as f32 / 255.0;
        Self::rgb(r, g, b)
    }

    /// Build from hue (degrees), saturation and lightness (`0.0..=1.0`)
    pub fn from_hsla(h: f32, s: f32, l: f32, a: f32) -> Self {
        let h = h.rem_euclid(360.0) / 360.0;
        let s = s.clamp(0.0, 1.0);
        let l = l.clamp(0.0, 1.0);

        if s == 0.0 {
            return Self::rgba(l, l, l, a);
        }

        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        Self::rgba(
            hue_to_rgb(p, q, h + 1.0 / 3.0),
            hue_to_rgb(p, q, h),
            hue_to_rgb(p, q, h - 1.0 / 3.0),
            a,
        )
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.a = alpha;
        self
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Channels as interpolation inputs: 0-255 color channels, 0-1 alpha
    pub fn to_rgba_tuple(&self) -> [f64; 4] {
        [
            (self.r as f64 * 255.0).round(),
            (self.g as f64 * 255.0).round(),
            (self.b as f64 * 255.0).round(),
            round_alpha(self.a),
        ]
    }

    /// Serialize as `rgba(r,g,b,a)`
    pub fn to_css(&self) -> String {
        let [r, g, b, a] = self.to_rgba_tuple();
        format!(
            "rgba({},{},{},{})",
            r as i64,
            g as i64,
            b as i64,
            crate::value::format_number(a)
        )
    }

    /// Linear interpolation between two colors
    pub fn lerp(a: &Color, b: &Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        Color {
            r: a.r + (b.r - a.r) * t,
            g: a.g + (b.g - a.g) * t,
            b: a.b + (b.b - a.b) * t,
            a: a.a + (b.a - a.a) * t,
        }
    }

    /// Parse any supported CSS color notation
    pub fn parse(input: &str) -> Result<Color, ColorParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ColorParseError::Empty);
        }

        if input.starts_with('#') {
            return all_consuming(parse_hex_color::<nom::error::Error<&str>>)(input)
                .map(|(_, color)| color)
                .map_err(|_| ColorParseError::InvalidHex(input.to_string()));
        }

        let mut rgb = all_consuming(parse_rgb_function::<nom::error::Error<&str>>);
        if let Ok((_, color)) = rgb(input) {
            return Ok(color);
        }

        let mut hsl = all_consuming(parse_hsl_function::<nom::error::Error<&str>>);
        if let Ok((_, color)) = hsl(input) {
            return Ok(color);
        }

        let lower = input.to_ascii_lowercase();
        if lower.starts_with("rgb") || lower.starts_with("hsl") {
            return Err(ColorParseError::InvalidFunction(input.to_string()));
        }

        named_color(&lower).ok_or_else(|| ColorParseError::UnknownName(input.to_string()))
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::parse(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}

fn round_alpha(a: f32) -> f64 {
    ((a.clamp(0.0, 1.0) as f64) * 1000.0).round() / 1000.0
}

fn hue_to_rgb(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

// ============================================================================
// Grammar
// ============================================================================

/// Parse hex color: #RGB, #RGBA, #RRGGBB, or #RRGGBBAA
fn parse_hex_color<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, Color, E> {
    let (rest, _) = char('#')(input)?;
    let (rest, hex) = take_while1(|c: char| c.is_ascii_hexdigit())(rest)?;

    let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).map(|d| d * 17);
    let pair = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);

    let channels = match hex.len() {
        3 => (digit(0), digit(1), digit(2), Ok(255)),
        4 => (digit(0), digit(1), digit(2), digit(3)),
        6 => (pair(0), pair(2), pair(4), Ok(255)),
        8 => (pair(0), pair(2), pair(4), pair(6)),
        _ => {
            return Err(nom::Err::Error(E::from_error_kind(
                input,
                ErrorKind::LengthValue,
            )))
        }
    };

    match channels {
        (Ok(r), Ok(g), Ok(b), Ok(a)) => Ok((rest, Color::from_rgba8(r, g, b, a))),
        _ => Err(nom::Err::Error(E::from_error_kind(
            input,
            ErrorKind::HexDigit,
        ))),
    }
}

/// A number with an optional `%` suffix
fn component<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, (f32, bool), E> {
    map(pair(float, opt(char('%'))), |(v, pct)| (v, pct.is_some()))(input)
}

/// Hue with an optional `deg` suffix
fn hue<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, f32, E> {
    terminated(float, opt(tag_no_case("deg")))(input)
}

/// Comma, whitespace, or `/` between components
fn separator<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, (), E> {
    alt((
        value((), delimited(multispace0, char(','), multispace0)),
        value((), delimited(multispace0, char('/'), multispace0)),
        value((), multispace1),
    ))(input)
}

fn open_paren<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, (), E> {
    value((), delimited(multispace0, char('('), multispace0))(input)
}

fn close_paren<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, (), E> {
    value((), preceded(multispace0, char(')')))(input)
}

fn alpha_channel((v, pct): (f32, bool)) -> f32 {
    if pct {
        (v / 100.0).clamp(0.0, 1.0)
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Parse rgb(r, g, b) and rgba(r, g, b, a)
fn parse_rgb_function<'a, E: NomParseError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Color, E> {
    let (input, _) = alt((tag_no_case("rgba"), tag_no_case("rgb")))(input)?;
    let (input, _) = open_paren(input)?;
    let (input, r) = component(input)?;
    let (input, _) = separator(input)?;
    let (input, g) = component(input)?;
    let (input, _) = separator(input)?;
    let (input, b) = component(input)?;
    let (input, a) = opt(preceded(separator, component))(input)?;
    let (input, _) = close_paren(input)?;

    let channel = |(v, pct): (f32, bool)| {
        if pct {
            (v / 100.0).clamp(0.0, 1.0)
        } else {
            (v / 255.0).clamp(0.0, 1.0)
        }
    };

    Ok((
        input,
        Color::rgba(
            channel(r),
            channel(g),
            channel(b),
            a.map(alpha_channel).unwrap_or(1.0),
        ),
    ))
}

/// Parse hsl(h, s%, l%) and hsla(h, s%, l%, a)
fn parse_hsl_function<'a, E: NomParseError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Color, E> {
    let (input, _) = alt((tag_no_case("hsla"), tag_no_case("hsl")))(input)?;
    let (input, _) = open_paren(input)?;
    let (input, h) = hue(input)?;
    let (input, _) = separator(input)?;
    let (input, (s, _)) = component(input)?;
    let (input, _) = separator(input)?;
    let (input, (l, _)) = component(input)?;
    let (input, a) = opt(preceded(separator, component))(input)?;
    let (input, _) = close_paren(input)?;

    Ok((
        input,
        Color::from_hsla(h, s / 100.0, l / 100.0, a.map(alpha_channel).unwrap_or(1.0)),
    ))
}

// ============================================================================
// Named colors
// ============================================================================

/// Resolve a lowercase CSS color keyword
pub fn named_color(name: &str) -> Option<Color> {
    if name == "transparent" {
        return Some(Color::TRANSPARENT);
    }
    NAMED_COLORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, hex)| Color::from_hex(*hex))
}

/// All CSS color keywords, `transparent` included
pub fn named_color_keywords() -> impl Iterator<Item = &'static str> {
    NAMED_COLORS
        .iter()
        .map(|(name, _)| *name)
        .chain(std::iter::once("transparent"))
}

const NAMED_COLORS: &[(&str, u32)] = &[
    ("aliceblue", 0xf0f8ff),
    ("antiquewhite", 0xfaebd7),
    ("aqua", 0x00ffff),
    ("aquamarine", 0x7fffd4),
    ("azure", 0xf0ffff),
    ("beige", 0xf5f5dc),
    ("bisque", 0xffe4c4),
    ("black", 0x000000),
    ("blanchedalmond", 0xffebcd),
    ("blue", 0x0000ff),
    ("blueviolet", 0x8a2be2),
    ("brown", 0xa52a2a),
    ("burlywood", 0xdeb887),
    ("cadetblue", 0x5f9ea0),
    ("chartreuse", 0x7fff00),
    ("chocolate", 0xd2691e),
    ("coral", 0xff7f50),
    ("cornflowerblue", 0x6495ed),
    ("cornsilk", 0xfff8dc),
    ("crimson", 0xdc143c),
    ("cyan", 0x00ffff),
    ("darkblue", 0x00008b),
    ("darkcyan", 0x008b8b),
    ("darkgoldenrod", 0xb8860b),
    ("darkgray", 0xa9a9a9),
    ("darkgreen", 0x006400),
    ("darkgrey", 0xa9a9a9),
    ("darkkhaki", 0xbdb76b),
    ("darkmagenta", 0x8b008b),
    ("darkolivegreen", 0x556b2f),
    ("darkorange", 0xff8c00),
    ("darkorchid", 0x9932cc),
    ("darkred", 0x8b0000),
    ("darksalmon", 0xe9967a),
    ("darkseagreen", 0x8fbc8f),
    ("darkslateblue", 0x483d8b),
    ("darkslategray", 0x2f4f4f),
    ("darkslategrey", 0x2f4f4f),
    ("darkturquoise", 0x00ced1),
    ("darkviolet", 0x9400d3),
    ("deeppink", 0xff1493),
    ("deepskyblue", 0x00bfff),
    ("dimgray", 0x696969),
    ("dimgrey", 0x696969),
    ("dodgerblue", 0x1e90ff),
    ("firebrick", 0xb22222),
    ("floralwhite", 0xfffaf0),
    ("forestgreen", 0x228b22),
    ("fuchsia", 0xff00ff),
    ("gainsboro", 0xdcdcdc),
    ("ghostwhite", 0xf8f8ff),
    ("gold", 0xffd700),
    ("goldenrod", 0xdaa520),
    ("gray", 0x808080),
    ("green", 0x008000),
    ("greenyellow", 0xadff2f),
    ("grey", 0x808080),
    ("honeydew", 0xf0fff0),
    ("hotpink", 0xff69b4),
    ("indianred", 0xcd5c5c),
    ("indigo", 0x4b0082),
    ("ivory", 0xfffff0),
    ("khaki", 0xf0e68c),
    ("lavender", 0xe6e6fa),
    ("lavenderblush", 0xfff0f5),
    ("lawngreen", 0x7cfc00),
    ("lemonchiffon", 0xfffacd),
    ("lightblue", 0xadd8e6),
    ("lightcoral", 0xf08080),
    ("lightcyan", 0xe0ffff),
    ("lightgoldenrodyellow", 0xfafad2),
    ("lightgray", 0xd3d3d3),
    ("lightgreen", 0x90ee90),
    ("lightgrey", 0xd3d3d3),
    ("lightpink", 0xffb6c1),
    ("lightsalmon", 0xffa07a),
    ("lightseagreen", 0x20b2aa),
    ("lightskyblue", 0x87cefa),
    ("lightslategray", 0x778899),
    ("lightslategrey", 0x778899),
    ("lightsteelblue", 0xb0c4de),
    ("lightyellow", 0xffffe0),
    ("lime", 0x00ff00),
    ("limegreen", 0x32cd32),
    ("linen", 0xfaf0e6),
    ("magenta", 0xff00ff),
    ("maroon", 0x800000),
    ("mediumaquamarine", 0x66cdaa),
    ("mediumblue", 0x0000cd),
    ("mediumorchid", 0xba55d3),
    ("mediumpurple", 0x9370db),
    ("mediumseagreen", 0x3cb371),
    ("mediumslateblue", 0x7b68ee),
    ("mediumspringgreen", 0x00fa9a),
    ("mediumturquoise", 0x48d1cc),
    ("mediumvioletred", 0xc71585),
    ("midnightblue", 0x191970),
    ("mintcream", 0xf5fffa),
    ("mistyrose", 0xffe4e1),
    ("moccasin", 0xffe4b5),
    ("navajowhite", 0xffdead),
    ("navy", 0x000080),
    ("oldlace", 0xfdf5e6),
    ("olive", 0x808000),
    ("olivedrab", 0x6b8e23),
    ("orange", 0xffa500),
    ("orangered", 0xff4500),
    ("orchid", 0xda70d6),
    ("palegoldenrod", 0xeee8aa),
    ("palegreen", 0x98fb98),
    ("paleturquoise", 0xafeeee),
    ("palevioletred", 0xdb7093),
    ("papayawhip", 0xffefd5),
    ("peachpuff", 0xffdab9),
    ("peru", 0xcd853f),
    ("pink", 0xffc0cb),
    ("plum", 0xdda0dd),
    ("powderblue", 0xb0e0e6),
    ("purple", 0x800080),
    ("rebeccapurple", 0x663399),
    ("red", 0xff0000),
    ("rosybrown", 0xbc8f8f),
    ("royalblue", 0x4169e1),
    ("saddlebrown", 0x8b4513),
    ("salmon", 0xfa8072),
    ("sandybrown", 0xf4a460),
    ("seagreen", 0x2e8b57),
    ("seashell", 0xfff5ee),
    ("sienna", 0xa0522d),
    ("silver", 0xc0c0c0),
    ("skyblue", 0x87ceeb),
    ("slateblue", 0x6a5acd),
    ("slategray", 0x708090),
    ("slategrey", 0x708090),
    ("snow", 0xfffafa),
    ("springgreen", 0x00ff7f),
    ("steelblue", 0x4682b4),
    ("tan", 0xd2b48c),
    ("teal", 0x008080),
    ("thistle", 0xd8bfd8),
    ("tomato", 0xff6347),
    ("turquoise", 0x40e0d0),
    ("violet", 0xee82ee),
    ("wheat", 0xf5deb3),
    ("white", 0xffffff),
    ("whitesmoke", 0xf5f5f5),
    ("yellow", 0xffff00),
    ("yellowgreen", 0x9acd32),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn css(input: &str) -> String {
        Color::parse(input).unwrap().to_css()
    }

    #[test]
    fn test_hex_forms() {
        assert_eq!(css("#fff"), "rgba(255,255,255,1)");
        assert_eq!(css("#f008"), "rgba(255,0,0,0.533)");
        assert_eq!(css("#336699"), "rgba(51,102,153,1)");
        assert_eq!(css("#33669980"), "rgba(51,102,153,0.502)");
        assert!(matches!(
            Color::parse("#12345"),
            Err(ColorParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_rgb_functions() {
        assert_eq!(css("rgb(10, 20, 30)"), "rgba(10,20,30,1)");
        assert_eq!(css("rgba(10,20,30,0.5)"), "rgba(10,20,30,0.5)");
        assert_eq!(css("rgb(100% 0% 50% / 25%)"), "rgba(255,0,128,0.25)");
        assert_eq!(css("RGBA(0, 0, 0, 1)"), "rgba(0,0,0,1)");
        assert!(matches!(
            Color::parse("rgb(1, 2)"),
            Err(ColorParseError::InvalidFunction(_))
        ));
    }

    #[test]
    fn test_hsl_functions() {
        assert_eq!(css("hsl(0, 100%, 50%)"), "rgba(255,0,0,1)");
        assert_eq!(css("hsl(120deg, 100%, 25%)"), "rgba(0,128,0,1)");
        assert_eq!(css("hsla(240, 100%, 50%, 0.5)"), "rgba(0,0,255,0.5)");
        assert_eq!(css("hsl(0, 0%, 50%)"), "rgba(128,128,128,1)");
    }

    #[test]
    fn test_named_colors() {
        assert_eq!(css("rebeccapurple"), "rgba(102,51,153,1)");
        assert_eq!(css("Tomato"), "rgba(255,99,71,1)");
        assert_eq!(css("transparent"), "rgba(0,0,0,0)");
        assert!(matches!(
            Color::parse("notacolor"),
            Err(ColorParseError::UnknownName(_))
        ));
        assert!(named_color_keywords().any(|k| k == "aliceblue"));
    }

    #[test]
    fn test_lerp() {
        let mid = Color::lerp(&Color::BLACK, &Color::WHITE, 0.5);
        assert!((mid.r - 0.5).abs() < 1e-6);
        assert_eq!(mid.a, 1.0);
    }
}
