//! Pluggable mapping from raw stream payloads to ticks.
//!
//! The default parser accepts two shapes, dispatching on a field
//! fingerprint: the plain `{time, price, volume?, side?}` record, and the
//! public-exchange `trade`/`aggTrade` record `{e, T, p, q, m}` where
//! prices and quantities arrive as decimal strings and `m = true` marks a
//! seller-initiated trade. Anything else is rejected (`None`) and dropped
//! upstream with a warning.

use bitchart_core::{Side, Tick};
use serde::Deserialize;

/// One parse result: a single tick, a batch, or nothing.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedTicks {
    One(Tick),
    Many(Vec<Tick>),
}

impl ParsedTicks {
    pub fn into_vec(self) -> Vec<Tick> {
        match self {
            Self::One(tick) => vec![tick],
            Self::Many(ticks) => ticks,
        }
    }
}

/// Strategy seam: one method, raw payload in, ticks out.
pub trait TickParser: Send {
    fn parse(&self, raw: &str) -> Option<ParsedTicks>;
}

#[derive(Deserialize)]
struct PlainShape {
    time: f64,
    price: f64,
    volume: Option<f64>,
    side: Option<String>,
}

#[derive(Deserialize)]
struct ExchangeTradeShape {
    e: String,
    #[serde(rename = "T")]
    trade_time: f64,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "m")]
    buyer_is_maker: Option<bool>,
}

impl PlainShape {
    fn into_tick(self) -> Option<Tick> {
        if !self.time.is_finite() || !self.price.is_finite() {
            return None;
        }
        let mut tick = Tick::new(self.time, self.price);
        tick.volume = self.volume.filter(|v| v.is_finite() && *v >= 0.0);
        tick.side = match self.side.as_deref() {
            Some("buy") => Some(Side::Buy),
            Some("sell") => Some(Side::Sell),
            _ => None,
        };
        Some(tick)
    }
}

impl ExchangeTradeShape {
    fn into_tick(self) -> Option<Tick> {
        if self.e != "trade" && self.e != "aggTrade" {
            return None;
        }
        let price: f64 = self.price.parse().ok()?;
        let quantity: f64 = self.quantity.parse().ok()?;
        let mut tick = Tick::new(self.trade_time, price).with_volume(quantity);
        // maker on the buy side means the aggressor sold
        tick.side = self.buyer_is_maker.map(|m| if m { Side::Sell } else { Side::Buy });
        Some(tick)
    }
}

/// Accepts both supported shapes, single records or arrays of them.
#[derive(Default)]
pub struct DefaultParser;

impl DefaultParser {
    fn parse_one(value: &serde_json::Value) -> Option<Tick> {
        if value.get("e").is_some() {
            let shape: ExchangeTradeShape = serde_json::from_value(value.clone()).ok()?;
            return shape.into_tick();
        }
        if value.get("time").is_some() && value.get("price").is_some() {
            let shape: PlainShape = serde_json::from_value(value.clone()).ok()?;
            return shape.into_tick();
        }
        None
    }
}

impl TickParser for DefaultParser {
    fn parse(&self, raw: &str) -> Option<ParsedTicks> {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        match value {
            serde_json::Value::Array(items) => {
                let ticks: Vec<Tick> = items.iter().filter_map(Self::parse_one).collect();
                if ticks.is_empty() {
                    None
                } else {
                    Some(ParsedTicks::Many(ticks))
                }
            }
            value => Self::parse_one(&value).map(ParsedTicks::One),
        }
    }
}

/// Strict parser for the exchange trade stream only; combined-stream
/// wrappers (`{"stream": ..., "data": {...}}`) are unwrapped first.
#[derive(Default)]
pub struct ExchangeTradeParser;

impl TickParser for ExchangeTradeParser {
    fn parse(&self, raw: &str) -> Option<ParsedTicks> {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        let payload = value.get("data").unwrap_or(&value);
        let shape: ExchangeTradeShape = serde_json::from_value(payload.clone()).ok()?;
        shape.into_tick().map(ParsedTicks::One)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_shape_parses() {
        let parser = DefaultParser;
        let out = parser
            .parse(r#"{"time": 1000.0, "price": 42.5, "volume": 2.0, "side": "sell"}"#)
            .unwrap();
        let ticks = out.into_vec();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].time, 1000.0);
        assert_eq!(ticks[0].price, 42.5);
        assert_eq!(ticks[0].volume, Some(2.0));
        assert_eq!(ticks[0].side, Some(Side::Sell));
    }

    #[test]
    fn plain_shape_optionals_are_optional() {
        let parser = DefaultParser;
        let ticks = parser
            .parse(r#"{"time": 5, "price": 1.25}"#)
            .unwrap()
            .into_vec();
        assert_eq!(ticks[0].volume, None);
        assert_eq!(ticks[0].side, None);
    }

    #[test]
    fn exchange_shape_parses_decimal_strings() {
        let parser = DefaultParser;
        let raw = r#"{"e":"trade","T":1700000000123.0,"p":"50000.10","q":"0.250","m":true}"#;
        let ticks = parser.parse(raw).unwrap().into_vec();
        assert_eq!(ticks[0].price, 50000.10);
        assert_eq!(ticks[0].volume, Some(0.25));
        assert_eq!(ticks[0].side, Some(Side::Sell));
    }

    #[test]
    fn array_payload_yields_many() {
        let parser = DefaultParser;
        let raw = r#"[{"time":1,"price":2},{"time":2,"price":3}]"#;
        match parser.parse(raw).unwrap() {
            ParsedTicks::Many(ticks) => assert_eq!(ticks.len(), 2),
            other => panic!("expected Many, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_rejected_not_panicked() {
        let parser = DefaultParser;
        assert!(parser.parse("not json").is_none());
        assert!(parser.parse(r#"{"unknown": true}"#).is_none());
        assert!(parser.parse(r#"{"e":"kline","T":1,"p":"1","q":"1"}"#).is_none());
    }

    #[test]
    fn exchange_parser_unwraps_combined_stream() {
        let parser = ExchangeTradeParser;
        let raw = r#"{"stream":"btcusdt@trade","data":{"e":"trade","T":5.0,"p":"9.5","q":"1.5","m":false}}"#;
        let ticks = parser.parse(raw).unwrap().into_vec();
        assert_eq!(ticks[0].price, 9.5);
        assert_eq!(ticks[0].side, Some(Side::Buy));
    }
}
