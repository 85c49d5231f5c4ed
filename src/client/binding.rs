//! The reserved attribute namespace binding DOM elements to operations.
//!
//! Elements opt into dispatch by carrying `data-live-<key>` attributes; the
//! fixed prefix keeps the namespace clear of ordinary application attributes.

use wasm_bindgen::JsCast;
use web_sys::Element;

pub const PREFIX: &str = "data-live";

/// The full attribute name for `key`: `data-live-click`, `data-live-state`…
pub fn name(key: &str) -> String {
    format!("{PREFIX}-{key}")
}

/// First element under `root` carrying the attribute, if any.
pub fn one(root: &Element, key: &str) -> Option<Element> {
    root.query_selector(&format!("[{}]", name(key))).ok().flatten()
}

/// All elements under `root` carrying the attribute.
pub fn all(root: &Element, key: &str) -> Vec<Element> {
    let mut elements = Vec::new();
    if let Ok(list) = root.query_selector_all(&format!("[{}]", name(key))) {
        for index in 0..list.length() {
            if let Some(node) = list.item(index) {
                if let Ok(element) = node.dyn_into::<Element>() {
                    elements.push(element);
                }
            }
        }
    }
    elements
}

/// The attribute's value on `node`, if present.
pub fn attr(node: &Element, key: &str) -> Option<String> {
    node.get_attribute(&name(key))
}
