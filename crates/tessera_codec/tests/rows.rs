use std::collections::HashMap;

use chrono_tz::Tz;
use tessera_codec::codec::{decode_one, encode_key};
use tessera_codec::tablecodec::{
    RowFormat, cut_index_key, cut_row, decode_column_value, decode_index_key, decode_row,
    encode_index_seek_key, encode_row, encode_value, row_with_cols, unflatten_datums,
};
use tessera_types::field_type::UNSIGNED_FLAG;
use tessera_types::{BinaryLiteral, Datum, Decimal, Duration, Enum, FieldType, MysqlType, Set, Time};

fn columns() -> Vec<(i64, FieldType, Datum)> {
    vec![
        (1, FieldType::new(MysqlType::LongLong), Datum::Int64(-100)),
        (
            2,
            FieldType::new(MysqlType::LongLong).with_flag(UNSIGNED_FLAG),
            Datum::Uint64(u64::MAX),
        ),
        (3, FieldType::new(MysqlType::Varchar), Datum::String("abc".to_string())),
        (4, FieldType::new(MysqlType::Double), Datum::Float64(5.5)),
        (
            5,
            FieldType::new(MysqlType::NewDecimal).with_flen(10).with_decimal(2),
            Datum::Decimal("-12.34".parse::<Decimal>().unwrap()),
        ),
        (
            6,
            FieldType::new(MysqlType::Datetime),
            Datum::Time(Time::parse("2011-01-01 10:00:00", MysqlType::Datetime, 0).unwrap()),
        ),
        (
            7,
            FieldType::new(MysqlType::Duration),
            Datum::Duration(Duration::parse("12:34:56", 0).unwrap()),
        ),
        (
            8,
            FieldType::with_elems(MysqlType::Enum, ["a", "b", "c"]),
            Datum::Enum(Enum {
                name: "b".to_string(),
                value: 2,
            }),
        ),
        (9, FieldType::new(MysqlType::Varchar), Datum::Null),
        (10, FieldType::new(MysqlType::Float), Datum::Float32(-1.25)),
        (
            11,
            FieldType::with_elems(MysqlType::Set, ["a", "b", "c"]),
            Datum::Set(Set {
                name: "a,c".to_string(),
                value: 5,
            }),
        ),
        (
            12,
            FieldType::new(MysqlType::Bit).with_flen(16),
            Datum::BinaryLiteral(BinaryLiteral(vec![1, 2])),
        ),
        (
            13,
            FieldType::new(MysqlType::Timestamp),
            Datum::Time(Time::parse("2019-04-01 08:00:00", MysqlType::Timestamp, 0).unwrap()),
        ),
    ]
}

fn encode_columns(format: RowFormat) -> Vec<u8> {
    let cols = columns();
    let ids: Vec<i64> = cols.iter().map(|(id, _, _)| *id).collect();
    let values: Vec<Datum> = cols.iter().map(|(_, _, v)| v.clone()).collect();
    encode_row(&chrono_tz::UTC, &values, &ids, format).unwrap()
}

#[test]
fn row_round_trip_both_formats() {
    logutil::init_test();
    for format in [RowFormat::Legacy, RowFormat::Compact] {
        let data = encode_columns(format);
        let types: HashMap<i64, FieldType> =
            columns().into_iter().map(|(id, ft, _)| (id, ft)).collect();
        let row = decode_row(&data, &types, &chrono_tz::UTC).unwrap();
        assert_eq!(columns().len(), row.len(), "{format:?}");
        for (id, _, value) in columns() {
            assert_eq!(value, row[&id], "{format:?} column {id}");
        }
    }
}

#[test]
fn partial_decode_with_missing_column() {
    logutil::init_test();
    for format in [RowFormat::Legacy, RowFormat::Compact] {
        let data = encode_columns(format);
        let mut types: HashMap<i64, FieldType> = columns()
            .into_iter()
            .filter(|(id, _, _)| *id <= 6 && *id != 3 && *id != 4)
            .map(|(id, ft, _)| (id, ft))
            .collect();
        types.insert(40, FieldType::new(MysqlType::Double));

        let row = decode_row(&data, &types, &chrono_tz::UTC).unwrap();
        assert_eq!(4, row.len(), "{format:?}");
        assert!(!row.contains_key(&40));
        assert_eq!(Datum::Int64(-100), row[&1]);

        let cols = vec![
            (40, FieldType::new(MysqlType::Double)),
            (1, FieldType::new(MysqlType::LongLong)),
        ];
        assert_eq!(
            vec![Datum::Null, Datum::Int64(-100)],
            row_with_cols(&data, &cols, &chrono_tz::UTC).unwrap()
        );
    }
}

#[test]
fn six_column_partial_decode() {
    logutil::init_test();
    let cols = vec![
        (1, FieldType::new(MysqlType::LongLong), Datum::Int64(100)),
        (2, FieldType::new(MysqlType::Varchar), Datum::String("abc".to_string())),
        (3, FieldType::new(MysqlType::NewDecimal), Datum::Decimal(Decimal::from_i64(1))),
        (4, FieldType::new(MysqlType::Float), Datum::Float32(0.5)),
        (
            5,
            FieldType::with_elems(MysqlType::Set, ["a"]),
            Datum::Set(Set {
                name: "a".to_string(),
                value: 1,
            }),
        ),
        (
            6,
            FieldType::new(MysqlType::Bit).with_flen(8),
            Datum::BinaryLiteral(BinaryLiteral(vec![100])),
        ),
    ];
    let ids: Vec<i64> = cols.iter().map(|(id, _, _)| *id).collect();
    let values: Vec<Datum> = cols.iter().map(|(_, _, v)| v.clone()).collect();
    let tz = chrono_tz::UTC;

    for format in [RowFormat::Legacy, RowFormat::Compact] {
        let data = encode_row(&tz, &values, &ids, format).unwrap();
        let mut types: HashMap<i64, FieldType> =
            cols.iter().map(|(id, ft, _)| (*id, ft.clone())).collect();

        let row = decode_row(&data, &types, &tz).unwrap();
        assert_eq!(6, row.len(), "{format:?}");
        for (id, _, value) in &cols {
            assert_eq!(value, &row[id], "{format:?} column {id}");
        }

        // Extra requested columns that were never encoded are left out.
        types.insert(4, FieldType::new(MysqlType::Float));
        types.insert(7, FieldType::new(MysqlType::Float));
        let row = decode_row(&data, &types, &tz).unwrap();
        assert_eq!(6, row.len(), "{format:?}");
        assert!(!row.contains_key(&7));
        for (id, _, value) in &cols {
            assert_eq!(value, &row[id], "{format:?} column {id}");
        }

        // Encoded columns that aren't requested are skipped.
        types.remove(&3);
        types.remove(&4);
        types.remove(&7);
        let row = decode_row(&data, &types, &tz).unwrap();
        let mut got: Vec<i64> = row.keys().copied().collect();
        got.sort_unstable();
        assert_eq!(vec![1, 2, 5, 6], got, "{format:?}");
        for (id, _, value) in cols.iter().filter(|(id, _, _)| ![3, 4].contains(id)) {
            assert_eq!(value, &row[id], "{format:?} column {id}");
        }
    }
}

#[test]
fn timestamp_stored_in_utc() {
    let tz: Tz = "Asia/Shanghai".parse().unwrap();
    let ft = FieldType::new(MysqlType::Timestamp);
    let local = Time::parse("2019-04-01 08:00:00", MysqlType::Timestamp, 0).unwrap();

    for format in [RowFormat::Legacy, RowFormat::Compact] {
        let data = encode_row(&tz, &[Datum::Time(local)], &[1], format).unwrap();

        let types = HashMap::from([(1, ft.clone())]);
        let in_utc = decode_row(&data, &types, &chrono_tz::UTC).unwrap();
        assert_eq!(
            Datum::Time(Time::parse("2019-04-01 00:00:00", MysqlType::Timestamp, 0).unwrap()),
            in_utc[&1]
        );

        let in_local = decode_row(&data, &types, &tz).unwrap();
        assert_eq!(Datum::Time(local), in_local[&1]);
    }
}

#[test]
fn cut_row_values_decode_per_column() {
    let data = encode_columns(RowFormat::Legacy);
    let offsets = HashMap::from([(1, 0), (3, 1), (50, 2)]);
    let cut = cut_row(&data, &offsets).unwrap();
    assert_eq!(3, cut.len());
    assert!(cut[2].is_none());

    let tz = chrono_tz::UTC;
    let first = decode_column_value(cut[0].unwrap(), &FieldType::new(MysqlType::LongLong), &tz).unwrap();
    assert_eq!(Datum::Int64(-100), first);
    assert_eq!(encode_value(&tz, &Datum::String("abc".to_string())).unwrap(), cut[1].unwrap());
}

#[test]
fn unflatten_restores_logical_types() {
    let tz = chrono_tz::UTC;
    let fts = vec![
        FieldType::new(MysqlType::Float),
        FieldType::new(MysqlType::Duration),
        FieldType::with_elems(MysqlType::Enum, ["x", "y"]),
    ];
    let stored = vec![Datum::Float64(1.5), Datum::Int64(1_000_000_000), Datum::Uint64(1)];
    let datums = unflatten_datums(&stored, &fts, &tz).unwrap();
    assert_eq!(Datum::Float32(1.5), datums[0]);
    assert_eq!(Datum::Duration(Duration::from_nanos(1_000_000_000, 0).unwrap()), datums[1]);
    assert_eq!(
        Datum::Enum(Enum {
            name: "x".to_string(),
            value: 1
        }),
        datums[2]
    );
}

#[test]
fn index_key_cut_and_display() {
    let values = vec![
        Datum::Int64(1),
        Datum::Bytes(b"abc".to_vec()),
        Datum::Float64(123.45),
        Datum::Int64(100),
    ];
    let key = encode_index_seek_key(10, 2, &encode_key(&values).unwrap());

    let (cols, handle) = cut_index_key(&key, &[7, 8, 9]).unwrap();
    assert_eq!(Datum::Bytes(b"abc".to_vec()), decode_one(cols[&8]).unwrap().1);
    assert_eq!(Datum::Int64(100), decode_one(handle).unwrap().1);

    let (table_id, index_id, shown) = decode_index_key(&key).unwrap();
    assert_eq!((10, 2), (table_id, index_id));
    assert_eq!(vec!["1", "abc", "123.45", "100"], shown);
}
