//! Round-trip property: `encode` then `parse` reproduces the original
//! address/word pairs.

use pdp8_loader::srec;

#[test]
fn encode_then_parse_is_the_identity_for_a_sparse_word_set() {
    let words = vec![(0u16, 0o1234u16), (5, 0o7777), (100, 0)];
    let text = srec::encode(&words);
    let image = srec::parse(&text).unwrap();
    assert_eq!(image.words, words);
}

#[test]
fn encode_then_parse_handles_a_contiguous_run() {
    let words: Vec<(u16, u16)> = (0..16).map(|i| (i, i * 3 & 0o7777)).collect();
    let text = srec::encode(&words);
    let image = srec::parse(&text).unwrap();
    assert_eq!(image.words, words);
}
