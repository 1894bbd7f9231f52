//! Integration tests for the Llama 3 chat flow.
//!
//! Uses a synthetic 128,000-entry merge table so special ids land where they
//! do for the real Llama 3 vocabulary.

use corebpe::llama3::{
    format_chat_prompt, format_dialog, is_stop_token, llama3_tokenizer, stop_token_ids,
    truncate_at_stop, ChatMessage, BEGIN_OF_TEXT, END_HEADER_ID, EOT_ID, START_HEADER_ID,
};
use corebpe::{StreamingDecoder, Tokenizer, Vocabulary};
use rustc_hash::FxHashMap;

const LLAMA3_MERGEABLE: u32 = 128_000;

/// Single bytes at their byte value, a few merges, then unreachable filler.
fn create_llama3_tokenizer() -> Tokenizer {
    let mut ranks: FxHashMap<Vec<u8>, u32> = FxHashMap::default();
    for b in 0..=255u8 {
        ranks.insert(vec![b], b as u32);
    }
    let merges = ["He", "ll", "llo", "Hello", "\n\n"];
    for (i, merge) in merges.iter().enumerate() {
        ranks.insert(merge.as_bytes().to_vec(), 256 + i as u32);
    }
    // 0xF8 never appears in UTF-8, so these entries are never produced by
    // a merge and never collide with a real byte sequence.
    for rank in (256 + merges.len() as u32)..LLAMA3_MERGEABLE {
        ranks.insert(vec![0xF8, (rank >> 16) as u8, (rank >> 8) as u8, rank as u8], rank);
    }
    llama3_tokenizer(Vocabulary::from_ranks(ranks)).unwrap()
}

/// Test the documented Meta special token ids.
#[test]
fn test_llama3_meta_special_tokens() {
    let tokenizer = create_llama3_tokenizer();

    assert_eq!(tokenizer.special_token_id("<|begin_of_text|>"), Some(128_000));
    assert_eq!(tokenizer.special_token_id("<|end_of_text|>"), Some(128_001));
    assert_eq!(tokenizer.special_token_id("<|start_header_id|>"), Some(128_006));
    assert_eq!(tokenizer.special_token_id("<|end_header_id|>"), Some(128_007));
    assert_eq!(tokenizer.special_token_id("<|eot_id|>"), Some(128_009));
    assert_eq!(
        tokenizer.special_token_id("<|reserved_special_token_250|>"),
        Some(128_255)
    );
    assert_eq!(tokenizer.vocab_size(), 128_256);
}

#[test]
fn test_llama3_stop_tokens() {
    let tokenizer = create_llama3_tokenizer();
    assert_eq!(stop_token_ids(&tokenizer), vec![128_001, 128_009]);
    assert!(is_stop_token(&tokenizer, 128_009));
    assert!(!is_stop_token(&tokenizer, 128_006));
}

#[test]
fn test_chat_prompt_encoding() {
    let tokenizer = create_llama3_tokenizer();
    let prompt = format_chat_prompt("You are a helpful assistant.", "Hello");
    let encoding = tokenizer.encode(&prompt);
    let ids = encoding.ids();

    assert_eq!(ids[0], 128_000);
    assert_eq!(ids[1], 128_006);
    assert_eq!(ids.iter().filter(|&&id| id == 128_009).count(), 2);
    assert_eq!(ids.iter().filter(|&&id| id == 128_006).count(), 3);
    assert_eq!(ids.last(), Some(&260));

    // The trailing "\n\n" of the open assistant header is trimmed on decode.
    assert_eq!(tokenizer.decode(ids), prompt.trim_end());
    assert_eq!(tokenizer.decode_bytes(ids), prompt.as_bytes());
}

#[test]
fn test_dialog_structure() {
    let prompt = format_dialog(&[
        ChatMessage::system("sys"),
        ChatMessage::user("one"),
        ChatMessage::assistant("two"),
        ChatMessage::user("three"),
    ]);

    assert!(prompt.starts_with(BEGIN_OF_TEXT));
    assert_eq!(prompt.matches(START_HEADER_ID).count(), 5);
    assert_eq!(prompt.matches(END_HEADER_ID).count(), 5);
    assert_eq!(prompt.matches(EOT_ID).count(), 4);
    assert!(prompt.contains("<|start_header_id|>assistant<|end_header_id|>\n\ntwo<|eot_id|>"));
}

/// The inference loop re-decodes the growing prefix after every generated
/// id; the streaming decoder must end up with the same text.
#[test]
fn test_generation_loop_decode() {
    let tokenizer = create_llama3_tokenizer();
    let answer = "Hello, 世界! 🦀";

    let mut generated = tokenizer.encode_ordinary(answer).into_ids();
    generated.push(128_009);
    generated.push(b'x' as u32);

    let mut streamer = StreamingDecoder::new(&tokenizer);
    let mut streamed = String::new();
    let mut prefix = Vec::new();
    let mut last_display = String::new();

    for &id in &generated {
        if is_stop_token(&tokenizer, id) {
            break;
        }
        prefix.push(id);

        let display = tokenizer.decode(&prefix);
        if !display.is_empty() {
            last_display = display;
        }
        if let Some(text) = streamer.add_token(id) {
            streamed.push_str(&text);
        }
    }
    streamed.push_str(&streamer.flush());

    assert_eq!(truncate_at_stop(&tokenizer, &generated), prefix.as_slice());
    assert_eq!(last_display, answer);
    assert_eq!(streamed, answer);
}
