//! Record parsers.
//!
//! Every record value is a JSON envelope `{"type": <1|2|3>, "data": {...}}`.
//! The typed parsers check the declared type before decoding the payload,
//! so a record filed under the wrong parser always reports a mismatch.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::error::{ParseError, ParseErrorKind};
use crate::types::{MarketData, MdKey, MdType, Meta, Order, RawRecord, Snapshot, Transaction};

#[derive(Deserialize)]
struct Header<'a> {
    #[serde(rename = "type", default)]
    kind: i64,
    #[serde(borrow, default)]
    data: Option<&'a RawValue>,
}

/// Decode the envelope header, keeping the payload undecoded.
fn read_header<'a>(
    record: &'a RawRecord,
    meta: &Meta,
    md_type: MdType,
) -> Result<Header<'a>, ParseError> {
    match serde_json::from_slice::<Option<Header<'a>>>(&record.value) {
        Ok(Some(header)) => Ok(header),
        Ok(None) => Err(ParseError::new(meta.clone(), ParseErrorKind::MissingEnvelope)),
        Err(source) => Err(ParseError::new(
            meta.clone(),
            ParseErrorKind::Decode { md_type, source },
        )),
    }
}

fn decode_payload<T: DeserializeOwned>(
    header: Header<'_>,
    mut meta: Meta,
    expected: MdType,
    event_time: impl Fn(&T) -> i64,
) -> Result<(T, Meta), ParseError> {
    if MdType::from_tag(header.kind) != expected {
        return Err(ParseError::new(
            meta,
            ParseErrorKind::TypeMismatch {
                expected,
                found: header.kind,
            },
        ));
    }

    let raw = match header.data {
        Some(raw) => raw,
        None => return Err(ParseError::new(meta, ParseErrorKind::MissingEnvelope)),
    };

    match serde_json::from_str::<T>(raw.get()) {
        Ok(payload) => {
            meta.event_time = event_time(&payload);
            Ok((payload, meta))
        }
        Err(source) => Err(ParseError::new(
            meta,
            ParseErrorKind::Decode {
                md_type: expected,
                source,
            },
        )),
    }
}

fn parse_typed<T: DeserializeOwned>(
    record: &RawRecord,
    expected: MdType,
    event_time: impl Fn(&T) -> i64,
) -> Result<(T, Meta), ParseError> {
    let meta = Meta::from_record(record);
    let header = read_header(record, &meta, expected)?;
    decode_payload(header, meta, expected, event_time)
}

pub fn parse_snapshot(record: &RawRecord) -> Result<(Snapshot, Meta), ParseError> {
    parse_typed(record, MdType::Snapshot, |s: &Snapshot| s.time)
}

pub fn parse_order(record: &RawRecord) -> Result<(Order, Meta), ParseError> {
    parse_typed(record, MdType::Order, |o: &Order| o.time)
}

pub fn parse_transaction(record: &RawRecord) -> Result<(Transaction, Meta), ParseError> {
    parse_typed(record, MdType::Transaction, |t: &Transaction| t.time)
}

/// Parse any record into a [`MarketData`] envelope, routing on its key.
///
/// Empty keys, unknown keys, missing envelopes and envelopes tagged
/// `Unknown` are each reported as their own error kind.
pub fn parse_market_data(record: &RawRecord) -> Result<(MarketData, Meta), ParseError> {
    let meta = Meta::from_record(record);

    if record.key.is_empty() {
        return Err(ParseError::new(meta, ParseErrorKind::EmptyKey));
    }
    let key = match record.key.parse::<MdKey>() {
        Ok(key) => key,
        Err(key) => return Err(ParseError::new(meta, ParseErrorKind::UnknownKey(key))),
    };

    let expected = key.expected_type();
    let header = read_header(record, &meta, expected)?;
    if MdType::from_tag(header.kind) == MdType::Unknown {
        return Err(ParseError::new(
            meta,
            ParseErrorKind::UnknownEnvelopeType(header.kind),
        ));
    }

    match key {
        MdKey::Snapshot => decode_payload(header, meta, expected, |s: &Snapshot| s.time)
            .map(|(s, meta)| (MarketData::Snapshot(s), meta)),
        MdKey::Order => decode_payload(header, meta, expected, |o: &Order| o.time)
            .map(|(o, meta)| (MarketData::Order(o), meta)),
        MdKey::Transaction => decode_payload(header, meta, expected, |t: &Transaction| t.time)
            .map(|(t, meta)| (MarketData::Transaction(t), meta)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{"type":1,"data":{"stock_id":"000001.SZ","trading_day":20230823,"time":92018000,"status":"I","prevclose":11.37,"open":0.0,"high":0.0,"low":0.0,"match":0.0,"ask_prices":[11.37,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0],"ask_volumes":[9.79,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0],"bid_prices":[11.37,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0],"bid_volumes":[9.79,0.9,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0],"trades_num":0,"volume":0,"turnover":0,"total_ask_volume":0,"total_bid_volume":0,"weighted_avg_ask_price":0.0,"weighted_avg_bid_price":0.0,"iopv":0,"high_limited":12.51,"low_limited":10.23}}"#;

    const ORDER: &str = r#"{"type":2,"data":{"stock_id":"001324.SZ","action_day":20230823,"time":92048490,"order":243233,"price":33.3,"volume":200.0,"order_kind":"0","function_code":"B","channel":2013,"order_ori_no":0,"biz_index":0}}"#;

    const TRANSACTION: &str = r#"{"type":3,"data":{"stock_id":"002672.SZ","action_day":20230823,"time":93331810,"index":2535299,"price":0.0,"volume":11700,"turnover":0,"bsflag":" ","order_kind":"0","function_code":"C","ask_order":0,"bid_order":2096531,"channel":2014,"biz_index":0}}"#;

    fn record(key: &str, value: &str) -> RawRecord {
        RawRecord::new(key, value, 42)
    }

    #[test]
    fn test_parse_snapshot() {
        let (snapshot, meta) = parse_snapshot(&record("snapshot", SNAPSHOT)).unwrap();

        assert_eq!(snapshot.stock_id, "000001.SZ");
        assert_eq!(snapshot.time, 92018000);
        assert_eq!(snapshot.trading_day, 20230823);
        assert_eq!(snapshot.status, "I");
        assert_eq!(snapshot.prev_close, 11.37);
        assert_eq!(snapshot.ask_prices.len(), 10);
        assert_eq!(snapshot.bid_volumes[1], 0.9);
        assert_eq!(snapshot.limit_up, 12.51);
        assert_eq!(meta.event_time, 92018000);
        assert_eq!(meta.offset, 42);
        assert_eq!(meta.key, "snapshot");
    }

    #[test]
    fn test_snapshot_bytes_with_order_parser() {
        let err = parse_order(&record("snapshot", SNAPSHOT)).unwrap_err();
        assert!(err.is_type_mismatch());
        assert_eq!(err.meta.offset, 42);
        assert_eq!(err.meta.event_time, 0);
    }

    #[test]
    fn test_every_mismatch_is_reported() {
        assert!(parse_transaction(&record("order", ORDER)).unwrap_err().is_type_mismatch());
        assert!(parse_snapshot(&record("order", TRANSACTION)).unwrap_err().is_type_mismatch());
        assert!(parse_order(&record("order", TRANSACTION)).unwrap_err().is_type_mismatch());
    }

    #[test]
    fn test_parse_order_and_transaction() {
        let (order, meta) = parse_order(&record("order", ORDER)).unwrap();
        assert_eq!(order.order_no, 243233);
        assert_eq!(order.volume, 200.0);
        assert_eq!(order.function_code, "B");
        assert_eq!(meta.event_time, 92048490);

        let (txn, meta) = parse_transaction(&record("transaction", TRANSACTION)).unwrap();
        assert_eq!(txn.index, 2535299);
        assert_eq!(txn.bid_order, 2096531);
        assert_eq!(txn.bs_flag, " ");
        assert_eq!(meta.event_time, 93331810);
    }

    #[test]
    fn test_decode_error_keeps_meta() {
        let err = parse_order(&record("order", "{not json")).unwrap_err();
        assert!(err.is_decode());
        assert_eq!(err.meta.key, "order");
        assert_eq!(err.meta.offset, 42);

        let err = parse_order(&record("order", r#"{"type":2,"data":{"price":"high"}}"#))
            .unwrap_err();
        assert!(err.is_decode());
        assert!(err.to_string().contains("order decode error"));
    }

    #[test]
    fn test_round_trip_through_envelope() {
        let (order, _) = parse_order(&record("order", ORDER)).unwrap();
        let bytes = MarketData::from(order.clone()).to_json().unwrap();
        let (decoded, _) = parse_order(&RawRecord::new("order", bytes, 1)).unwrap();
        assert_eq!(decoded, order);
    }

    #[test]
    fn test_round_trip_full_snapshot() {
        let snapshot = Snapshot {
            stock_id: "600000.SH".to_string(),
            trading_day: 20230823,
            time: 93015250,
            status: "T".to_string(),
            prev_close: 7.25,
            open: 7.5,
            high: 7.75,
            low: 7.125,
            last: 7.625,
            ask_prices: vec![7.625, 7.75, 7.875],
            ask_volumes: vec![100.0, 250.0, 300.5],
            bid_prices: vec![7.5, 7.375, 7.25],
            bid_volumes: vec![400.0, 50.25, 12.0],
            trades_num: 1834,
            volume: 2_450_300,
            turnover: 18_377_250,
            total_ask_volume: 9_120_000,
            total_bid_volume: 8_004_500,
            weighted_avg_ask_price: 8.0625,
            weighted_avg_bid_price: 6.9375,
            iopv: 7_512,
            limit_up: 7.975,
            limit_down: 6.525,
        };

        let bytes = MarketData::from(snapshot.clone()).to_json().unwrap();
        let (decoded, meta) = parse_snapshot(&RawRecord::new("snapshot", bytes, 7)).unwrap();
        assert_eq!(decoded, snapshot);
        assert_eq!(meta.event_time, 93015250);
    }

    #[test]
    fn test_round_trip_full_transaction() {
        let txn = Transaction {
            stock_id: "002672.SZ".to_string(),
            action_day: 20230823,
            time: 93331810,
            index: 2535299,
            price: 10.5,
            volume: 11700,
            turnover: 122_850,
            bs_flag: "B".to_string(),
            order_kind: "0".to_string(),
            function_code: "F".to_string(),
            ask_order: 2096530,
            bid_order: 2096531,
            channel: 2014,
            biz_index: 88,
        };

        let bytes = MarketData::from(txn.clone()).to_json().unwrap();
        let (decoded, meta) =
            parse_transaction(&RawRecord::new("transaction", bytes, 8)).unwrap();
        assert_eq!(decoded, txn);
        assert_eq!(meta.event_time, 93331810);
    }

    #[test]
    fn test_parse_market_data_routes_by_key() {
        let (md, meta) = parse_market_data(&record("transaction", TRANSACTION)).unwrap();
        assert_eq!(md.md_type(), MdType::Transaction);
        assert_eq!(md.stock_id(), "002672.SZ");
        assert_eq!(meta.event_time, 93331810);

        let (md, _) = parse_market_data(&record("snapshot", SNAPSHOT)).unwrap();
        assert!(matches!(md, MarketData::Snapshot(ref s) if s.time == 92018000));
    }

    #[test]
    fn test_parse_market_data_errors() {
        let err = parse_market_data(&record("quote", ORDER)).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnknownKey(ref k) if k == "quote"));

        let err = parse_market_data(&record("", ORDER)).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::EmptyKey));

        let err = parse_market_data(&record("order", "null")).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::MissingEnvelope));

        let err = parse_market_data(&record("order", r#"{"type":2,"data":null}"#)).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::MissingEnvelope));

        let err = parse_market_data(&record("order", r#"{"type":0,"data":{}}"#)).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnknownEnvelopeType(0)));

        // key and declared type disagree
        let err = parse_market_data(&record("order", SNAPSHOT)).unwrap_err();
        assert!(err.is_type_mismatch());
    }
}
