//! Parley Benchmark Suite
//!
//! Hot paths on every dialogue request:
//!   action_extraction_mixed_reply ..... all four directive formats
//!   action_extraction_plain_prose ..... no directives, cleanup only
//!   conversation_append_at_capacity ... eviction at the history bound
//!   memory_override_full_history ...... restoring a client-held memory

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Map, Value};

use parley_core::{ActionExtractor, NpcContext};

const MIXED_REPLY: &str = "The merchant leans in. [GIVE_ITEM:item=gold,amount=50] \
*SMILES: warmly* You have my thanks, outlander.\n\n\n<GESTURE>points to the door</GESTURE>\n\
```json\n{\"type\": \"QUEST_UPDATE\", \"quest\": \"silt_strider\", \"stage\": 2, \"done\": false}\n```\n\
Safe travels.";

const PLAIN_REPLY: &str = "The ash storms have been bad this season.   Stay inside after dark, \
and keep your lantern lit.\n\n\n\nThe guards will not come for you out there.";

fn bench_extraction(c: &mut Criterion) {
    let extractor = ActionExtractor::default();

    c.bench_function("action_extraction_mixed_reply", |b| {
        b.iter(|| black_box(extractor.extract(black_box(MIXED_REPLY))));
    });

    c.bench_function("action_extraction_plain_prose", |b| {
        b.iter(|| black_box(extractor.extract(black_box(PLAIN_REPLY))));
    });
}

fn bench_history(c: &mut Criterion) {
    let mut ctx = NpcContext::skeleton("bench_npc");
    for i in 0..10 {
        ctx.add_conversation(format!("question {i}"), format!("answer {i}"));
    }

    c.bench_function("conversation_append_at_capacity", |b| {
        b.iter(|| {
            ctx.add_conversation(black_box("Any news?"), black_box("None worth telling."));
        });
    });

    let conversations: Vec<Value> = (0..25)
        .map(|i| json!({"timestamp": i, "player": format!("q{i}"), "npc": format!("a{i}")}))
        .collect();
    let events: Vec<Value> = (0..40)
        .map(|i| json!({"timestamp": i, "type": "combat", "description": {"round": i}}))
        .collect();
    let mut overrides = Map::new();
    overrides.insert("conversations".into(), Value::Array(conversations));
    overrides.insert("events".into(), Value::Array(events));
    overrides.insert("disposition".into(), json!(75));

    c.bench_function("memory_override_full_history", |b| {
        b.iter(|| {
            let mut fresh = NpcContext::skeleton("bench_npc");
            fresh
                .apply_memory_override(black_box(&overrides))
                .expect("valid override");
            black_box(fresh);
        });
    });
}

criterion_group!(benches, bench_extraction, bench_history);
criterion_main!(benches);
