//!
//! # rcx21utils unit tests
//!

use serde::{Deserialize, Serialize};

use super::*;

crate::enumstr!(
    /// # Rule-File Flag States
    FlagState {
        On: "ON",
        Off: "OFF",
        True: "TRUE",
    }
);

#[test]
fn test_enumstr() {
    assert_eq!(FlagState::On.to_str(), "ON");
    assert_eq!(FlagState::True.to_string(), "TRUE");
    assert_eq!(FlagState::from_str("OFF"), Some(FlagState::Off));
    assert_eq!(FlagState::from_str("off"), None);
    assert_eq!(FlagState::from_str_nocase("off"), Some(FlagState::Off));
    assert_eq!(FlagState::from_str("MAYBE"), None);
    assert_eq!(
        FlagState::variants(),
        &[FlagState::On, FlagState::Off, FlagState::True]
    );
    assert!(FlagState::On < FlagState::True);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Corner {
    name: String,
    rate: f64,
    layers: Vec<usize>,
}
impl SerdeFile for Corner {}

#[test]
fn test_format_from_path() {
    use SerializationFormat::{Json, Toml, Yaml};
    assert_eq!(SerializationFormat::from_path("a/b.json"), Some(Json));
    assert_eq!(SerializationFormat::from_path("b.YML"), Some(Yaml));
    assert_eq!(SerializationFormat::from_path("b.yaml"), Some(Yaml));
    assert_eq!(SerializationFormat::from_path("c.toml"), Some(Toml));
    assert_eq!(SerializationFormat::from_path("rules.txt"), None);
    assert_eq!(SerializationFormat::from_path("noext"), None);
}

#[test]
fn test_serde_file() -> Result<(), Error> {
    let corner = Corner {
        name: "typ".into(),
        rate: 0.5,
        layers: vec![1, 2, 3],
    };
    let dir = tempfile::tempdir()?;
    for ext in ["json", "yaml", "toml"] {
        let path = dir.path().join(format!("corner.{}", ext));
        let fmt = SerializationFormat::from_path(&path).ok_or(Error::msg("no format"))?;
        corner.save(fmt, &path)?;
        assert_eq!(Corner::open(&path, fmt)?, corner);
        assert_eq!(Corner::open_any(&path)?, corner);
    }
    Ok(())
}

#[test]
fn test_from_str_dedents() -> Result<(), Error> {
    let src = r#"
        name: slow
        rate: 1.0
        layers: [1]
    "#;
    let corner: Corner = SerializationFormat::Yaml.from_str(src)?;
    assert_eq!(corner.name, "slow");
    assert_eq!(corner.layers, vec![1]);
    Ok(())
}

struct LineReader {
    line: usize,
}
impl ErrorHelper for LineReader {
    type Error = String;
    fn err(&self, msg: impl Into<String>) -> Self::Error {
        format!("Line {}: {}", self.line, msg.into())
    }
}

#[test]
fn test_error_helper() {
    let r = LineReader { line: 7 };
    let ok: Result<usize, String> = "12".parse::<usize>().unwrapper(&r, "bad count");
    assert_eq!(ok, Ok(12));
    let bad: Result<usize, String> = "x".parse::<usize>().unwrapper(&r, "bad count");
    assert_eq!(bad, Err("Line 7: bad count".to_string()));
    assert_eq!(None::<u8>.unwrapper(&r, "missing"), Err("Line 7: missing".into()));
    assert!(r.assert(true, "never").is_ok());
    assert_eq!(r.assert(false, "nope"), Err("Line 7: nope".into()));
}
