//! Compares this engine's encoded size against `bincode`/`cbor`/`json` for
//! a representative message, the same kind of overhead sanity check the
//! teacher's own `main.rs` ran for its leaf-tree encodings.

use serde::{Deserialize, Serialize};
use tplcodec::{
    BindingCommon, ByteOrder, Engine, EngineConfig, PrimitiveKind, Template, TemplateBuilder, TemplateField,
};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Reading {
    sensor_id: u16,
    temperature_centi_c: i16,
    humidity_pct: u8,
}

fn build_template() -> Template<Reading> {
    TemplateBuilder::new("Reading")
        .field(TemplateField::new(
            "sensor_id",
            tplcodec::Binding::Primitive {
                common: BindingCommon::default(),
                kind: PrimitiveKind::U16,
                byte_order: ByteOrder::BigEndian,
            },
            |r: &Reading| r.sensor_id,
            |r: &mut Reading, v: u16| r.sensor_id = v,
        ))
        .field(TemplateField::new(
            "temperature_centi_c",
            tplcodec::Binding::Primitive {
                common: BindingCommon::default(),
                kind: PrimitiveKind::I16,
                byte_order: ByteOrder::BigEndian,
            },
            |r: &Reading| r.temperature_centi_c,
            |r: &mut Reading, v: i16| r.temperature_centi_c = v,
        ))
        .field(TemplateField::new(
            "humidity_pct",
            tplcodec::Binding::Primitive {
                common: BindingCommon::default(),
                kind: PrimitiveKind::U8,
                byte_order: ByteOrder::BigEndian,
            },
            |r: &Reading| r.humidity_pct,
            |r: &mut Reading, v: u8| r.humidity_pct = v,
        ))
        .build()
        .expect("template is well formed")
}

fn main() {
    let reading = Reading {
        sensor_id: 42,
        temperature_centi_c: 2137,
        humidity_pct: 55,
    };

    let template = build_template();
    let engine = Engine::new(&EngineConfig::default());
    let tplcodec_bytes = engine.encode(&template, &reading).expect("encode");

    let bincode_bytes = bincode::serialize(&reading).expect("bincode encode");
    let cbor_bytes = serde_cbor::to_vec(&reading).expect("cbor encode");
    let json_bytes = serde_json::to_vec(&reading).expect("json encode");

    println!("tplcodec: {} bytes", tplcodec_bytes.len());
    println!("bincode:  {} bytes", bincode_bytes.len());
    println!("cbor:     {} bytes", cbor_bytes.len());
    println!("json:     {} bytes", json_bytes.len());

    let decoded: Reading = engine.decode(&template, &tplcodec_bytes).expect("decode");
    assert_eq!(decoded.sensor_id, reading.sensor_id);
    assert_eq!(decoded.temperature_centi_c, reading.temperature_centi_c);
    assert_eq!(decoded.humidity_pct, reading.humidity_pct);
}
