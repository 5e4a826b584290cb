//! Integration scenarios exercising the public builder/engine API against
//! realistic message shapes: fixed layout, conditional fields, variant
//! dispatch, size-prefixed arrays, and checksum verification.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tplcodec::{
    Alternative, Binding, BindingCommon, BitOrder, ByteOrder, ChecksumAlgorithmKind, CollectionBinding, Engine,
    EngineConfig, EvaluatedField, PrimitiveKind, SelectFrom, Template, TemplateBuilder, TemplateField, TypeTag,
};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Beacon {
    id: u8,
}

fn beacon_template() -> Template<Beacon> {
    TemplateBuilder::new("Beacon")
        .field(TemplateField::new(
            "id",
            Binding::Primitive {
                common: BindingCommon::default(),
                kind: PrimitiveKind::U8,
                byte_order: ByteOrder::BigEndian,
            },
            |b: &Beacon| b.id,
            |b: &mut Beacon, v: u8| b.id = v,
        ))
        .build()
        .unwrap()
}

#[test]
fn fixed_layout_round_trips() {
    let engine = Engine::new(&EngineConfig::default());
    let template = beacon_template();
    let bytes = engine.encode(&template, &Beacon { id: 7 }).unwrap();
    assert_eq!(bytes, vec![7u8]);
    let decoded = engine.decode(&template, &bytes).unwrap();
    assert_eq!(decoded, Beacon { id: 7 });
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Flagged {
    flag: u8,
    extra: u8,
}

fn flagged_template() -> Template<Flagged> {
    TemplateBuilder::new("Flagged")
        .field(TemplateField::new(
            "flag",
            Binding::Primitive {
                common: BindingCommon::default(),
                kind: PrimitiveKind::U8,
                byte_order: ByteOrder::BigEndian,
            },
            |f: &Flagged| f.flag,
            |f: &mut Flagged, v: u8| f.flag = v,
        ))
        .field(
            TemplateField::new(
                "extra",
                Binding::Primitive {
                    common: BindingCommon::default(),
                    kind: PrimitiveKind::U8,
                    byte_order: ByteOrder::BigEndian,
                },
                |f: &Flagged| f.extra,
                |f: &mut Flagged, v: u8| f.extra = v,
            )
            .condition("self.flag==1"),
        )
        .build()
        .unwrap()
}

#[test]
fn conditional_field_is_skipped_when_flag_clear() {
    let engine = Engine::new(&EngineConfig::default());
    let template = flagged_template();
    let decoded = engine.decode(&template, &[0x00]).unwrap();
    assert_eq!(decoded.flag, 0);
    assert_eq!(decoded.extra, 0);
}

#[test]
fn conditional_field_is_read_when_flag_set() {
    let engine = Engine::new(&EngineConfig::default());
    let template = flagged_template();
    let decoded = engine.decode(&template, &[0x01, 0x09]).unwrap();
    assert_eq!(decoded.flag, 1);
    assert_eq!(decoded.extra, 9);
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Samples {
    count: u8,
    values: Vec<i64>,
}

fn samples_template() -> Template<Samples> {
    TemplateBuilder::new("Samples")
        .field(TemplateField::new(
            "count",
            Binding::Primitive {
                common: BindingCommon::default(),
                kind: PrimitiveKind::U8,
                byte_order: ByteOrder::BigEndian,
            },
            |s: &Samples| s.count,
            |s: &mut Samples, v: u8| s.count = v,
        ))
        .field(
            TemplateField::new(
                "values",
                Binding::ArrayPrimitive {
                    common: BindingCommon::default(),
                    element: PrimitiveKind::U8,
                    byte_order: ByteOrder::BigEndian,
                    size_expr: Some("self.count".into()),
                },
                |s: &Samples| s.values.clone(),
                |s: &mut Samples, v: Vec<i64>| s.values = v,
            )
            .collection(CollectionBinding::SizePrefixed),
        )
        .build()
        .unwrap()
}

#[test]
fn array_length_driven_by_prior_field() {
    let engine = Engine::new(&EngineConfig::default());
    let template = samples_template();
    let decoded = engine.decode(&template, &[0x03, 10, 20, 30]).unwrap();
    assert_eq!(decoded.count, 3);
    assert_eq!(decoded.values, vec![10, 20, 30]);
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct ChecksummedFrame {
    payload: Vec<i64>,
    checksum: i64,
}

fn checksummed_template() -> Template<ChecksummedFrame> {
    TemplateBuilder::new("ChecksummedFrame")
        .field(TemplateField::new(
            "payload",
            Binding::ArrayPrimitive {
                common: BindingCommon::default(),
                element: PrimitiveKind::U8,
                byte_order: ByteOrder::BigEndian,
                size_expr: Some("4".into()),
            },
            |f: &ChecksummedFrame| f.payload.clone(),
            |f: &mut ChecksummedFrame, v: Vec<i64>| f.payload = v,
        ))
        .checksum(tplcodec::ChecksumField::new(
            "checksum",
            ChecksumAlgorithmKind::Xor16,
            ByteOrder::BigEndian,
            2,
            |f: &ChecksummedFrame| f.checksum,
            |f: &mut ChecksummedFrame, v: i64| f.checksum = v,
        ))
        .build()
        .unwrap()
}

#[test]
fn checksum_matches_xor_of_payload() {
    let engine = Engine::new(&EngineConfig::default());
    let template = checksummed_template();
    let bytes = [0x01u8, 0x02, 0x03, 0x04, 0x00, 0x04];
    let decoded = engine.decode(&template, &bytes).unwrap();
    assert_eq!(decoded.payload, vec![1, 2, 3, 4]);
    assert_eq!(decoded.checksum, 0x04);
}

#[test]
fn checksum_mismatch_is_rejected() {
    let engine = Engine::new(&EngineConfig::default());
    let template = checksummed_template();
    let bytes = [0x01u8, 0x02, 0x03, 0x04, 0x00, 0x05];
    let err = engine.decode(&template, &bytes).unwrap_err();
    assert!(matches!(err, tplcodec::BoxonError::Data(_)));
}

#[test]
fn checksum_field_is_written_verbatim_on_encode() {
    let engine = Engine::new(&EngineConfig::default());
    let template = checksummed_template();
    let frame = ChecksummedFrame {
        payload: vec![1, 2, 3, 4],
        checksum: 0x99,
    };
    let bytes = engine.encode(&template, &frame).unwrap();
    assert_eq!(bytes, vec![0x01, 0x02, 0x03, 0x04, 0x00, 0x99]);
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Counted {
    count: u16,
    doubled: i64,
}

fn counted_template() -> Template<Counted> {
    TemplateBuilder::new("Counted")
        .field(TemplateField::new(
            "count",
            Binding::Primitive {
                common: BindingCommon::default(),
                kind: PrimitiveKind::U16,
                byte_order: ByteOrder::BigEndian,
            },
            |c: &Counted| c.count,
            |c: &mut Counted, v: u16| c.count = v,
        ))
        .evaluated(EvaluatedField::new(
            "doubled",
            "self.count * 2",
            |c: &mut Counted, v: i64| c.doubled = v,
        ))
        .build()
        .unwrap()
}

#[test]
fn evaluated_field_is_derived_without_consuming_bytes() {
    let engine = Engine::new(&EngineConfig::default());
    let template = counted_template();
    let decoded = engine.decode(&template, &[0x00, 0x0A]).unwrap();
    assert_eq!(decoded.count, 10);
    assert_eq!(decoded.doubled, 20);

    let bytes = engine.encode(&template, &decoded).unwrap();
    assert_eq!(bytes, vec![0x00, 0x0A]);
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct KindA {
    a: u8,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct KindB {
    b: u8,
}

fn kind_a_template() -> Template<KindA> {
    TemplateBuilder::new("KindA")
        .field(TemplateField::new(
            "a",
            Binding::Primitive {
                common: BindingCommon::default(),
                kind: PrimitiveKind::U8,
                byte_order: ByteOrder::BigEndian,
            },
            |k: &KindA| k.a,
            |k: &mut KindA, v: u8| k.a = v,
        ))
        .build()
        .unwrap()
}

fn kind_b_template() -> Template<KindB> {
    TemplateBuilder::new("KindB")
        .field(TemplateField::new(
            "b",
            Binding::Primitive {
                common: BindingCommon::default(),
                kind: PrimitiveKind::U8,
                byte_order: ByteOrder::BigEndian,
            },
            |k: &KindB| k.b,
            |k: &mut KindB, v: u8| k.b = v,
        ))
        .build()
        .unwrap()
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Envelope {
    payload: Value,
}

fn select_from() -> SelectFrom {
    SelectFrom {
        prefix_size: 8,
        bit_order: BitOrder::BigEndian,
        alternatives: vec![
            Alternative {
                condition: "#prefix==1".into(),
                prefix: 1,
                type_tag: TypeTag::new("kind_a"),
            },
            Alternative {
                condition: "#prefix==2".into(),
                prefix: 2,
                type_tag: TypeTag::new("kind_b"),
            },
        ],
        select_default: None,
    }
}

fn envelope_template() -> Template<Envelope> {
    TemplateBuilder::new("Envelope")
        .field(TemplateField::new(
            "payload",
            Binding::Object {
                common: BindingCommon::default(),
                select_from: select_from(),
            },
            |e: &Envelope| e.payload.clone(),
            |e: &mut Envelope, v: Value| e.payload = v,
        ))
        .build()
        .unwrap()
}

fn engine_with_variants() -> Engine {
    let engine = Engine::new(&EngineConfig::default());
    engine.register(TypeTag::new("kind_a"), Arc::new(kind_a_template()));
    engine.register(TypeTag::new("kind_b"), Arc::new(kind_b_template()));
    engine
}

#[test]
fn variant_dispatch_picks_alternative_by_prefix() {
    let engine = engine_with_variants();
    let template = envelope_template();
    let decoded = engine.decode(&template, &[0x02, 0x2a]).unwrap();
    assert_eq!(decoded.payload, serde_json::json!({"type": "kind_b", "value": {"b": 42}}));
}

#[test]
fn variant_round_trips_through_encode() {
    let engine = engine_with_variants();
    let template = envelope_template();
    let original = Envelope {
        payload: serde_json::json!({"type": "kind_a", "value": {"a": 9}}),
    };
    let bytes = engine.encode(&template, &original).unwrap();
    assert_eq!(bytes, vec![0x01, 0x09]);
    let decoded = engine.decode(&template, &bytes).unwrap();
    assert_eq!(decoded.payload, original.payload);
}
