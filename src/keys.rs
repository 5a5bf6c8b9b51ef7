//! Named-key lookup for the `send_keys` handler.

/// A key press as the DevTools input domain wants it.
#[derive(Clone, Debug)]
pub struct KeySpec {
    pub key: &'static str,
    pub code: &'static str,
    pub vk: i64,
    pub text: Option<&'static str>,
}

/// Resolve an agent-supplied key name (`ENTER`, `TAB`, `ARROW_DOWN`, …).
/// Unrecognized names are treated as literal text by the caller.
pub fn named_key(name: &str) -> Option<KeySpec> {
    let spec = match name.to_ascii_uppercase().as_str() {
        "ENTER" | "RETURN" => KeySpec {
            key: "Enter",
            code: "Enter",
            vk: 13,
            text: Some("\r"),
        },
        "TAB" => KeySpec {
            key: "Tab",
            code: "Tab",
            vk: 9,
            text: None,
        },
        "ESCAPE" | "ESC" => KeySpec {
            key: "Escape",
            code: "Escape",
            vk: 27,
            text: None,
        },
        "SPACE" => KeySpec {
            key: " ",
            code: "Space",
            vk: 32,
            text: Some(" "),
        },
        "BACKSPACE" => KeySpec {
            key: "Backspace",
            code: "Backspace",
            vk: 8,
            text: None,
        },
        "DELETE" => KeySpec {
            key: "Delete",
            code: "Delete",
            vk: 46,
            text: None,
        },
        "ARROW_UP" => KeySpec {
            key: "ArrowUp",
            code: "ArrowUp",
            vk: 38,
            text: None,
        },
        "ARROW_DOWN" => KeySpec {
            key: "ArrowDown",
            code: "ArrowDown",
            vk: 40,
            text: None,
        },
        "ARROW_LEFT" => KeySpec {
            key: "ArrowLeft",
            code: "ArrowLeft",
            vk: 37,
            text: None,
        },
        "ARROW_RIGHT" => KeySpec {
            key: "ArrowRight",
            code: "ArrowRight",
            vk: 39,
            text: None,
        },
        "PAGE_UP" => KeySpec {
            key: "PageUp",
            code: "PageUp",
            vk: 33,
            text: None,
        },
        "PAGE_DOWN" => KeySpec {
            key: "PageDown",
            code: "PageDown",
            vk: 34,
            text: None,
        },
        "HOME" => KeySpec {
            key: "Home",
            code: "Home",
            vk: 36,
            text: None,
        },
        "END" => KeySpec {
            key: "End",
            code: "End",
            vk: 35,
            text: None,
        },
        _ => return named_function_key(name),
    };
    Some(spec)
}

fn named_function_key(name: &str) -> Option<KeySpec> {
    const F_KEYS: [(&str, &str, i64); 12] = [
        ("F1", "F1", 112),
        ("F2", "F2", 113),
        ("F3", "F3", 114),
        ("F4", "F4", 115),
        ("F5", "F5", 116),
        ("F6", "F6", 117),
        ("F7", "F7", 118),
        ("F8", "F8", 119),
        ("F9", "F9", 120),
        ("F10", "F10", 121),
        ("F11", "F11", 122),
        ("F12", "F12", 123),
    ];
    let upper = name.to_ascii_uppercase();
    F_KEYS
        .iter()
        .find(|(key, _, _)| *key == upper)
        .map(|(key, code, vk)| KeySpec {
            key,
            code,
            vk: *vk,
            text: None,
        })
}
