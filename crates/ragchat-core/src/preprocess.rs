//! Question normalisation applied before retrieval and generation

/// Normalise a user question.
///
/// Question marks are removed, the first character is title-cased and the
/// rest lower-cased, surrounding whitespace is trimmed, and a single
/// `" ?"` suffix is appended. Capitalisation happens before trimming, so
/// input with leading whitespace ends up entirely lower-case.
pub fn preprocess_query(query: &str) -> String {
    let without_marks = query.replace('?', "");

    let capitalized = match without_marks.chars().next() {
        Some(first) => {
            // Lower-case the whole string so a final sigma sees its neighbours.
            let lowered = without_marks.to_lowercase();
            let mut capitalized = titlecase(first);
            capitalized.extend(lowered.chars().skip(first.to_lowercase().count()));
            capitalized
        }
        None => String::new(),
    };

    format!("{} ?", capitalized.trim())
}

/// Title case of a single character. It differs from upper case for
/// digraphs, ligatures, `ß` and Greek letters with iota subscript.
fn titlecase(c: char) -> String {
    let mapped = match c {
        'Ǆ' | 'ǅ' | 'ǆ' => "ǅ",
        'Ǉ' | 'ǈ' | 'ǉ' => "ǈ",
        'Ǌ' | 'ǋ' | 'ǌ' => "ǋ",
        'Ǳ' | 'ǲ' | 'ǳ' => "ǲ",
        'ß' => "Ss",
        'ﬀ' => "Ff",
        'ﬁ' => "Fi",
        'ﬂ' => "Fl",
        'ﬃ' => "Ffi",
        'ﬄ' => "Ffl",
        'ﬅ' | 'ﬆ' => "St",
        'և' => "Եւ",
        'ᾳ' | 'ᾼ' => "ᾼ",
        'ῃ' | 'ῌ' => "ῌ",
        'ῳ' | 'ῼ' => "ῼ",
        _ => return iota_subscript_titlecase(c).unwrap_or_else(|| c.to_uppercase().collect()),
    };
    mapped.to_string()
}

/// `ᾀ..ᾇ`, `ᾐ..ᾗ` and `ᾠ..ᾧ` title-case to the letter eight code points on;
/// those title-case letters map to themselves.
fn iota_subscript_titlecase(c: char) -> Option<String> {
    let code = c as u32;
    let block_start = [0x1F80, 0x1F90, 0x1FA0]
        .into_iter()
        .find(|start| (*start..*start + 16).contains(&code))?;
    let titled = if code < block_start + 8 { code + 8 } else { code };
    char::from_u32(titled).map(String::from)
}
