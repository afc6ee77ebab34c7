// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.


use once_cell::sync::Lazy;
use regex::Regex;

static BLOCK_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<\s*(?:br|/?p)\b[^>]*>").expect("block tag pattern"));
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

/// Plain text of a feed post body. Paragraph and line breaks become spaces,
/// inline markup (links, mentions, hashtags) is dropped without a gap so
/// linkified locators stay in one piece.
pub fn to_plain_text(content: &str) -> String {
    let spaced = BLOCK_TAG.replace_all(content, " ");
    let stripped = ANY_TAG.replace_all(&spaced, "");
    decode_entities(stripped.trim())
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
