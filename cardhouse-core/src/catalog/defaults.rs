//! Built-in packages seeded into an empty store.
//!
//! Card lists are generated rather than stored so the library carries no
//! asset files.

use serde_json::{json, Map, Value};

use super::types::{Card, PackageMetadata};

/// Id of the built-in package preferred on first start.
pub const STANDARD_PLAYING_CARDS: &str = "Standard Playing Cards";

/// A package ready to be written to the store.
#[derive(Debug, Clone)]
pub struct BuiltinPackage {
    pub metadata: PackageMetadata,
    pub cards: Vec<Card>,
}

/// Every built-in package, sorted by id.
pub fn builtin_packages() -> Vec<BuiltinPackage> {
    vec![dominoes(), mahjong(), standard_playing_cards()]
}

fn card(id: String, name: String, properties: Value) -> Card {
    let properties = match properties {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Card {
        id,
        name,
        set_code: None,
        properties,
    }
}

fn metadata(name: &str, extra: Value) -> PackageMetadata {
    let mut metadata = PackageMetadata {
        name: name.to_string(),
        all_cards_url_page_count: 1,
        ..PackageMetadata::default()
    };
    if let Value::Object(map) = extra {
        metadata.extra = map;
    }
    metadata
}

fn standard_playing_cards() -> BuiltinPackage {
    const SUITS: [&str; 4] = ["Clubs", "Diamonds", "Hearts", "Spades"];
    const RANKS: [&str; 13] = [
        "A", "2", "3", "4", "5", "6", "7", "8", "9", "10", "J", "Q", "K",
    ];

    let mut cards = Vec::with_capacity(SUITS.len() * RANKS.len() + 2);
    for suit in SUITS {
        for (value, rank) in RANKS.iter().enumerate() {
            cards.push(card(
                format!("{}{}", rank, &suit[..1]),
                format!("{} of {}", rank, suit),
                json!({ "suit": suit, "rank": rank, "value": value + 1 }),
            ));
        }
    }
    cards.push(card("JKR1".into(), "Red Joker".into(), json!({ "suit": "Joker" })));
    cards.push(card("JKR2".into(), "Black Joker".into(), json!({ "suit": "Joker" })));

    BuiltinPackage {
        metadata: metadata(
            STANDARD_PLAYING_CARDS,
            json!({ "cardSize": { "x": 2.5, "y": 3.5 }, "deckFileType": "txt" }),
        ),
        cards,
    }
}

fn dominoes() -> BuiltinPackage {
    let mut cards = Vec::with_capacity(28);
    for high in 0..=6u8 {
        for low in 0..=high {
            cards.push(card(
                format!("{}-{}", low, high),
                format!("{}|{}", low, high),
                json!({ "low": low, "high": high, "pips": low + high }),
            ));
        }
    }

    BuiltinPackage {
        metadata: metadata("Dominoes", json!({ "cardSize": { "x": 1.0, "y": 2.0 } })),
        cards,
    }
}

fn mahjong() -> BuiltinPackage {
    let mut cards = Vec::with_capacity(34);
    for suit in ["Bamboo", "Characters", "Dots"] {
        for rank in 1..=9u8 {
            cards.push(card(
                format!("{}{}", &suit[..1], rank),
                format!("{} {}", rank, suit),
                json!({ "suit": suit, "rank": rank }),
            ));
        }
    }
    for honor in ["East", "South", "West", "North", "Red", "Green", "White"] {
        cards.push(card(
            honor.to_string(),
            honor.to_string(),
            json!({ "suit": "Honor" }),
        ));
    }

    BuiltinPackage {
        metadata: metadata("Mahjong", json!({ "cardSize": { "x": 1.0, "y": 1.3 } })),
        cards,
    }
}
