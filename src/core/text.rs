//! Text normalization, similarity and recognition-text filters
//!
//! Pure helpers shared by the session dedup logic, the recognition router and the
//! LLM sentence buffer. Nothing here holds state.
//!
//! Lengths are measured in `char`s throughout so CJK text compares the same way as
//! ASCII text.

/// Marks that end a sentence, full-width and ASCII.
pub const SENTENCE_TERMINALS: [char; 6] = ['。', '？', '！', '.', '?', '!'];

/// Punctuation trimmed from both ends before deciding whether a fragment carries meaning.
const EDGE_PUNCTUATION: &str = "。，、；：？！\u{201c}\u{201d}\u{2018}\u{2019}（）【】《》\"'";

/// Fragments that never warrant a reply on their own.
const FILLER_WORDS: &[&str] = &[
    "嗯", "啊", "呃", "额", "哦", "噢", "呀", "哈", "嘿", "喂", "哼", "唉", "哎", "诶", "欸", "嗯嗯",
    "啊啊", "呃呃", "哦哦", "呵呵", "哈哈", "什么", "啥", "咋", "哪", "那个", "这个", "额额", "啊这",
    "啊这这",
];

/// Single filler syllables stripped from the start of an otherwise meaningful fragment.
const LEADING_FILLERS: &[&str] = &[
    "嗯", "啊", "呃", "额", "哦", "噢", "呀", "哈", "嘿", "喂", "哼", "唉", "哎", "诶", "欸",
];

/// Single-character answers that are meaningful on their own.
const SHORT_ANSWERS: &[&str] = &["行", "可", "不", "否", "要"];

/// Character kept by [`normalize`]: letters (including CJK ideographs) and digits.
#[inline]
fn is_content_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Normalize text for comparison.
///
/// Keeps only letters, digits and ideographs, then collapses runs of the same character
/// so stutters like `喂喂喂` compare equal to `喂`.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last: Option<char> = None;

    for c in text.chars().filter(|c| is_content_char(*c)) {
        if last != Some(c) {
            out.push(c);
            last = Some(c);
        }
    }

    out
}

/// Levenshtein distance over `char`s.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Similarity in `[0, 1]`: `1 - distance / max_len`.
///
/// Two empty strings are identical; an empty string shares nothing with a non-empty one.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    1.0 - edit_distance(a, b) as f64 / max_len as f64
}

/// Whether the text contains a sentence-terminal mark anywhere.
pub fn is_complete_sentence(text: &str) -> bool {
    text.contains(SENTENCE_TERMINALS)
}

/// Split off the first complete sentence, terminal mark included.
///
/// Returns `(sentence, rest)` or `None` when no terminal mark is present.
pub fn split_first_sentence(text: &str) -> Option<(&str, &str)> {
    let (idx, mark) = text.char_indices().find(|(_, c)| SENTENCE_TERMINALS.contains(c))?;
    Some(text.split_at(idx + mark.len_utf8()))
}

fn trim_edge_punctuation(text: &str) -> &str {
    text.trim()
        .trim_matches(|c: char| EDGE_PUNCTUATION.contains(c))
        .trim()
}

/// Whether a recognized fragment is noise: empty, a filler word, or a lone character
/// that is not a short answer.
pub fn is_meaningless(text: &str) -> bool {
    let core = trim_edge_punctuation(text);

    if core.is_empty() || FILLER_WORDS.contains(&core) {
        return true;
    }

    core.chars().count() == 1 && !SHORT_ANSWERS.contains(&core)
}

/// Filter a recognized fragment before it reaches the language model.
///
/// Returns an empty string when nothing meaningful is left. Each leading filler syllable
/// is stripped at most once, in list order.
pub fn filter_recognized(text: &str) -> String {
    if is_meaningless(text) {
        return String::new();
    }

    let mut rest = text.trim();
    for filler in LEADING_FILLERS {
        if let Some(stripped) = rest.strip_prefix(filler) {
            rest = stripped.trim();
        }
    }

    if is_meaningless(rest) {
        return String::new();
    }

    rest.to_string()
}

fn is_pictograph(c: char) -> bool {
    matches!(
        c as u32,
        0x1F300..=0x1F9FF | 0x2600..=0x26FF | 0x2700..=0x27BF | 0xFE00..=0xFE0F | 0x200D
    )
}

/// Remove emoji and other pictographic glyphs a synthesizer cannot speak.
pub fn strip_pictographs(text: &str) -> String {
    text.chars()
        .filter(|c| !is_pictograph(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Byte offset in `text` just past the content whose normalized form equals `prefix`.
///
/// Trailing repeats of the prefix's final character are absorbed into the prefix so a
/// stutter at the join does not show up as new content. Returns `None` when the
/// normalized text does not start with `prefix`.
pub fn normalized_prefix_end(text: &str, prefix: &str) -> Option<usize> {
    let target: Vec<char> = prefix.chars().collect();
    let mut matched = 0;
    let mut last: Option<char> = None;

    for (idx, c) in text.char_indices() {
        if matched == target.len() {
            if is_content_char(c) && last == Some(c) {
                continue;
            }
            return Some(idx);
        }

        if !is_content_char(c) || last == Some(c) {
            continue;
        }
        if target[matched] != c {
            return None;
        }

        last = Some(c);
        matched += 1;
    }

    (matched == target.len()).then_some(text.len())
}
