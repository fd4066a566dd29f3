//! Type-directed synthetic data generation.
//!
//! Values are derived from a seeded ChaCha20 stream so a run is reproducible
//! from its summary's seed. Field-name heuristics sit in a registered table
//! consulted before the type-directed default; new domain formats are added
//! by registering an entry, not by editing control flow.

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore as _, SeedableRng as _};
use serde_json::Value;

use std::collections::BTreeMap;

use crate::{DroverError, DroverResult, SchemaNode};

/// Values extracted from earlier responses, keyed by logical name. Scoped to
/// one orchestration iteration; the Driver may re-seed one designated
/// binding across iterations.
#[derive(Debug, Clone, Default)]
pub struct ChainContext {
    values: BTreeMap<String, Value>,
}

impl ChainContext {
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub type FieldGenerator = fn(&mut ChaCha20Rng) -> Value;

/// One (predicate, generator) entry in the heuristic table.
pub struct FieldHeuristic {
    pub name: &'static str,
    pub applies: fn(&str) -> bool,
    pub generate: FieldGenerator,
}

/// Built-in heuristics for identity-shaped fields. Each format's exact
/// character layout is fixed; consumers parse these positionally.
pub fn default_heuristics() -> Vec<FieldHeuristic> {
    vec![
        FieldHeuristic {
            name: "gstin",
            applies: is_gstin_field,
            generate: gen_gstin,
        },
        FieldHeuristic {
            name: "pan",
            applies: is_pan_field,
            generate: gen_pan,
        },
        FieldHeuristic {
            name: "phone",
            applies: is_phone_field,
            generate: gen_phone,
        },
    ]
}

fn is_gstin_field(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "gst" | "gstin" | "gst_number" | "gstin_number"
    )
}

fn is_pan_field(name: &str) -> bool {
    matches!(name.to_ascii_lowercase().as_str(), "pan" | "pan_number")
}

fn is_phone_field(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "phone" | "mobile" | "phone_number" | "mobile_number" | "contact_number"
    )
}

/// 15 characters: 2-digit state code (01-35), 5 uppercase letters, 4 digits,
/// 1 uppercase letter, 1 entity character [1-9A-Z], literal 'Z', 1 checksum
/// character [0-9A-Z].
fn gen_gstin(rng: &mut ChaCha20Rng) -> Value {
    let mut s = String::with_capacity(15);
    let state = 1 + rng.next_u32() % 35;
    s.push_str(&format!("{state:02}"));
    for _ in 0..5 {
        s.push(upper(rng));
    }
    for _ in 0..4 {
        s.push(digit(rng));
    }
    s.push(upper(rng));
    s.push(pick(rng, b"123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
    s.push('Z');
    s.push(pick(rng, b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
    Value::String(s)
}

/// 10 characters: 5 uppercase letters, 4 digits, 1 uppercase letter.
fn gen_pan(rng: &mut ChaCha20Rng) -> Value {
    let mut s = String::with_capacity(10);
    for _ in 0..5 {
        s.push(upper(rng));
    }
    for _ in 0..4 {
        s.push(digit(rng));
    }
    s.push(upper(rng));
    Value::String(s)
}

/// 10 digits, leading digit 6-9.
fn gen_phone(rng: &mut ChaCha20Rng) -> Value {
    let mut s = String::with_capacity(10);
    s.push(pick(rng, b"6789"));
    for _ in 0..9 {
        s.push(digit(rng));
    }
    Value::String(s)
}

fn digit(rng: &mut ChaCha20Rng) -> char {
    char::from(b'0' + (rng.next_u32() % 10) as u8)
}

fn upper(rng: &mut ChaCha20Rng) -> char {
    char::from(b'A' + (rng.next_u32() % 26) as u8)
}

fn pick(rng: &mut ChaCha20Rng, set: &[u8]) -> char {
    char::from(set[(rng.next_u32() as usize) % set.len()])
}

fn uuid_token(rng: &mut ChaCha20Rng) -> Value {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    Value::String(uuid::Builder::from_random_bytes(bytes).into_uuid().to_string())
}

pub struct Generator {
    heuristics: Vec<FieldHeuristic>,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator {
    pub fn new() -> Self {
        Self {
            heuristics: default_heuristics(),
        }
    }

    pub fn with_heuristics(heuristics: Vec<FieldHeuristic>) -> Self {
        Self { heuristics }
    }

    pub fn register(&mut self, heuristic: FieldHeuristic) {
        self.heuristics.push(heuristic);
    }

    /// Synthesize a value conforming to `schema`. `field` is the property
    /// name being filled, when there is one; a ChainContext binding under
    /// that name wins over everything else.
    pub fn generate(
        &self,
        schema: &SchemaNode,
        field: Option<&str>,
        ctx: &ChainContext,
        rng: &mut ChaCha20Rng,
    ) -> DroverResult<Value> {
        if let Some(name) = field {
            if let Some(bound) = ctx.get(name) {
                return Ok(bound.clone());
            }
        }

        match schema {
            // `format: uuid` and the default both produce a UUID-shaped
            // token; unrecognized formats fall through to the default too.
            SchemaNode::String {
                format: _,
                enum_values,
            } => {
                if !enum_values.is_empty() {
                    let choice = &enum_values[(rng.next_u32() as usize) % enum_values.len()];
                    return Ok(Value::String(choice.clone()));
                }
                if let Some(name) = field {
                    for heuristic in &self.heuristics {
                        if (heuristic.applies)(name) {
                            return Ok((heuristic.generate)(rng));
                        }
                    }
                }
                Ok(uuid_token(rng))
            }
            SchemaNode::Integer => Ok(Value::from(rng.next_u32() % 100)),
            SchemaNode::Boolean => Ok(Value::Bool(rng.next_u32() % 2 == 0)),
            SchemaNode::Object { properties } => {
                let mut out = serde_json::Map::new();
                for (name, child) in properties {
                    let value = self.generate(child, Some(name), ctx, rng)?;
                    out.insert(name.clone(), value);
                }
                Ok(Value::Object(out))
            }
            // Arrays are always a single synthetic element.
            SchemaNode::Array { items } => {
                Ok(Value::Array(vec![self.generate(items, None, ctx, rng)?]))
            }
            SchemaNode::Reference { target } => Err(DroverError::UnsupportedSchemaType(
                format!("unresolved reference {target:?}"),
            )),
        }
    }
}

/// Hash a small seed into a full ChaCha20 key so nearby seeds do not produce
/// related streams.
pub fn rng_from_seed(seed: u64) -> ChaCha20Rng {
    let hash = blake3::hash(&seed.to_le_bytes());
    let mut seed32 = [0u8; 32];
    seed32.copy_from_slice(&hash.as_bytes()[..32]);
    ChaCha20Rng::from_seed(seed32)
}

pub fn gen_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
