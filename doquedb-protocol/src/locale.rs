//! Language tags and tag sets.
//!
//! A tag pairs an ISO 639-1 language with an optional ISO 3166-1 country,
//! both identified on the wire by their ordinal in the fixed tables below
//! (`0` means undefined). A set is written in text as `+`-separated tags,
//! e.g. `en-us+ja-jp`, and is kept sorted and free of duplicates.
//!
//! Wire layout: `i32 count` then `count * (i32 language, i32 country)`.

use crate::error::ProtocolError;
use crate::frame::WireRead;
use bytes::BufMut;
use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

const LANGUAGES: [&str; 139] = [
    "aa", "ab", "af", "am", "ar", "as", "ay", "az", "ba", "be", "bg", "bh", "bi", "bn", "bo",
    "br", "ca", "co", "cs", "cy", "da", "de", "dz", "el", "en", "eo", "es", "et", "eu", "fa",
    "fi", "fj", "fo", "fr", "fy", "ga", "gd", "gl", "gn", "gu", "ha", "he", "hi", "hr", "hu",
    "hy", "ia", "id", "ie", "ik", "is", "it", "iu", "ja", "jw", "ka", "kk", "kl", "km", "kn",
    "ko", "ks", "ku", "ky", "la", "ln", "lo", "lt", "lv", "mg", "mi", "mk", "ml", "mn", "mo",
    "mr", "ms", "mt", "my", "na", "ne", "nl", "no", "oc", "om", "or", "pa", "pl", "ps", "pt",
    "qu", "rm", "rn", "ro", "ru", "rw", "sa", "sd", "sg", "sh", "si", "sk", "sl", "sm", "sn",
    "so", "sq", "sr", "ss", "st", "su", "sv", "sw", "ta", "te", "tg", "th", "ti", "tk", "tl",
    "tn", "to", "tr", "ts", "tt", "tw", "ug", "uk", "ur", "uz", "vi", "vo", "wo", "xh", "yi",
    "yo", "za", "zh", "zu",
];

const COUNTRIES: [&str; 240] = [
    "af", "al", "dz", "as", "ad", "ao", "ai", "aq", "ag", "ar", "am", "aw", "au", "at", "az",
    "bs", "bh", "bd", "bb", "by", "be", "bz", "bj", "bm", "bt", "bo", "ba", "bw", "bv", "br",
    "io", "bn", "bg", "bf", "bi", "kh", "cm", "ca", "cv", "ky", "cf", "td", "cl", "cn", "cx",
    "cc", "co", "km", "cd", "cg", "ck", "cr", "ci", "hr", "cu", "cy", "cz", "dk", "dj", "dm",
    "do", "tl", "ec", "eg", "sv", "gq", "er", "ee", "et", "fk", "fo", "fj", "fi", "fr", "fx",
    "gf", "pf", "tf", "ga", "gm", "ge", "de", "gh", "gi", "gr", "gl", "gd", "gp", "gu", "gt",
    "gn", "gw", "gy", "ht", "hm", "hn", "hk", "hu", "is", "in", "id", "ir", "iq", "ie", "il",
    "it", "jm", "jp", "jo", "kz", "ke", "ki", "kp", "kr", "kw", "kg", "la", "lv", "lb", "ls",
    "lr", "ly", "li", "lt", "lu", "mo", "mk", "mg", "mw", "my", "mv", "ml", "mt", "mh", "mq",
    "mr", "mu", "yt", "mx", "fm", "md", "mc", "mn", "ms", "ma", "mz", "mm", "na", "nr", "np",
    "nl", "an", "nc", "nz", "ni", "ne", "ng", "nu", "nf", "mp", "no", "om", "pk", "pw", "ps",
    "pa", "pg", "py", "pe", "ph", "pn", "pl", "pt", "pr", "qa", "re", "ro", "ru", "rw", "kn",
    "lc", "vc", "ws", "sm", "st", "sa", "sn", "sc", "sl", "sg", "sk", "si", "sb", "so", "za",
    "gs", "es", "lk", "sh", "pm", "sd", "sr", "sj", "sz", "se", "ch", "sy", "tw", "tj", "tz",
    "th", "tg", "tk", "to", "tt", "tn", "tr", "tm", "tc", "tv", "ug", "ua", "ae", "gb", "us",
    "um", "uy", "uz", "vu", "va", "ve", "vn", "vg", "vi", "wf", "eh", "ye", "yu", "zm", "zw",
];

/// Language code for "undefined".
pub const UNDEFINED: u16 = 0;

/// Looks up the ordinal code of a two-letter language symbol.
pub fn language_code(symbol: &str) -> Option<u16> {
    let symbol = symbol.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .position(|s| *s == symbol)
        .map(|i| i as u16 + 1)
}

/// Looks up the ordinal code of a two-letter country symbol.
pub fn country_code(symbol: &str) -> Option<u16> {
    let symbol = symbol.to_ascii_lowercase();
    COUNTRIES
        .iter()
        .position(|s| *s == symbol)
        .map(|i| i as u16 + 1)
}

pub fn language_symbol(code: u16) -> Option<&'static str> {
    (code as usize).checked_sub(1).and_then(|i| LANGUAGES.get(i).copied())
}

pub fn country_symbol(code: u16) -> Option<&'static str> {
    (code as usize).checked_sub(1).and_then(|i| COUNTRIES.get(i).copied())
}

/// One language, optionally qualified by a country.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocaleTag {
    language: u16,
    country: u16,
}

impl LocaleTag {
    pub fn new(language: u16, country: u16) -> Result<Self, ProtocolError> {
        if language_symbol(language).is_none() {
            return Err(ProtocolError::InvalidLocale(format!("language code {language}")));
        }
        if country != UNDEFINED && country_symbol(country).is_none() {
            return Err(ProtocolError::InvalidLocale(format!("country code {country}")));
        }
        Ok(Self { language, country })
    }

    pub fn language(&self) -> u16 {
        self.language
    }

    pub fn country(&self) -> u16 {
        self.country
    }
}

impl FromStr for LocaleTag {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidLocale(s.to_string());
        let (lang, country) = match s.trim().split_once(|c: char| c == '-' || c == '_') {
            Some((l, c)) => (l, Some(c)),
            None => (s.trim(), None),
        };
        let language = language_code(lang).ok_or_else(invalid)?;
        let country = match country {
            Some(c) => country_code(c).ok_or_else(invalid)?,
            None => UNDEFINED,
        };
        Ok(Self { language, country })
    }
}

impl fmt::Display for LocaleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(language_symbol(self.language).unwrap_or("undefined"))?;
        if let Some(country) = country_symbol(self.country) {
            write!(f, "-{country}")?;
        }
        Ok(())
    }
}

/// A sorted set of locale tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LocaleTagSet {
    tags: BTreeSet<LocaleTag>,
}

impl LocaleTagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: LocaleTag) {
        self.tags.insert(tag);
    }

    pub fn contains(&self, tag: &LocaleTag) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocaleTag> {
        self.tags.iter()
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.tags.len() as i32);
        for tag in &self.tags {
            buf.put_i32(i32::from(tag.language));
            buf.put_i32(i32::from(tag.country));
        }
    }

    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, ProtocolError> {
        let count = reader.read_count_wire()?;
        let mut set = Self::new();
        for _ in 0..count {
            let language = reader.read_i32_wire()?;
            let country = reader.read_i32_wire()?;
            let language = u16::try_from(language)
                .map_err(|_| ProtocolError::InvalidLocale(format!("language code {language}")))?;
            let country = u16::try_from(country)
                .map_err(|_| ProtocolError::InvalidLocale(format!("country code {country}")))?;
            set.insert(LocaleTag::new(language, country)?);
        }
        Ok(set)
    }
}

impl FromIterator<LocaleTag> for LocaleTagSet {
    fn from_iter<I: IntoIterator<Item = LocaleTag>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().collect(),
        }
    }
}

impl FromStr for LocaleTagSet {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('+')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(LocaleTag::from_str)
            .collect()
    }
}

impl fmt::Display for LocaleTagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tag) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{tag}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use std::io::Cursor;

    #[test]
    fn test_table_ordinals() {
        assert_eq!(language_code("aa"), Some(1));
        assert_eq!(language_code("en"), Some(25));
        assert_eq!(language_code("JA"), Some(54));
        assert_eq!(language_code("zu"), Some(139));
        assert_eq!(country_code("af"), Some(1));
        assert_eq!(country_code("zw"), Some(240));
        assert_eq!(language_symbol(0), None);
        assert_eq!(language_symbol(140), None);
    }

    #[test]
    fn test_set_text_is_canonical() {
        let set: LocaleTagSet = "ja-jp+en-us".parse().unwrap();
        assert_eq!(set.to_string(), "en-us+ja-jp");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_set_deduplicates() {
        let set: LocaleTagSet = "en+en+fr".parse().unwrap();
        assert_eq!(set.to_string(), "en+fr");
    }

    #[test]
    fn test_empty_set() {
        let set: LocaleTagSet = "".parse().unwrap();
        assert!(set.is_empty());
        assert_eq!(set.to_string(), "");
    }

    #[test]
    fn test_unknown_symbol_rejected() {
        assert!("xx".parse::<LocaleTagSet>().is_err());
        assert!("en-zz".parse::<LocaleTagSet>().is_err());
    }

    #[test]
    fn test_wire_layout() {
        let set: LocaleTagSet = "ja".parse().unwrap();
        let mut buf = BytesMut::new();
        set.encode(&mut buf);
        assert_eq!(&buf[..], &[0, 0, 0, 1, 0, 0, 0, 54, 0, 0, 0, 0]);
        let decoded = LocaleTagSet::decode(&mut Cursor::new(buf.to_vec())).unwrap();
        assert_eq!(decoded, set);
    }

    #[test]
    fn test_decode_rejects_out_of_table_codes() {
        let mut buf = BytesMut::new();
        buf.put_i32(1);
        buf.put_i32(500);
        buf.put_i32(0);
        let result = LocaleTagSet::decode(&mut Cursor::new(buf.to_vec()));
        assert!(matches!(result, Err(ProtocolError::InvalidLocale(_))));
    }
}
