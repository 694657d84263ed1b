//! Static table of supported tag types: which attributes each one may carry,
//! which markup template it renders through, and how its value behaves.

/// Placeholder replaced with the rendered attribute string.
pub const ATTRS_SLOT: &str = "%attrs%";
/// Placeholder replaced with the tag's inner content.
pub const INNER_SLOT: &str = "%inner%";

const INPUT_TEMPLATE: &str = "<input%attrs% />";

const TEXT_ATTRS: &[&str] = &[
    "name", "id", "type", "value", "class", "placeholder", "autocomplete", "autofocus",
    "disabled", "readonly", "required", "maxlength", "minlength", "pattern", "size", "list",
];

const RANGED_ATTRS: &[&str] = &[
    "name", "id", "type", "value", "class", "placeholder", "autocomplete", "autofocus",
    "disabled", "readonly", "required", "min", "max", "step", "list",
];

const CHECKABLE_ATTRS: &[&str] = &[
    "name", "id", "type", "value", "checked", "class", "disabled", "required",
];

const BUTTON_ATTRS: &[&str] = &["name", "id", "type", "value", "class", "disabled"];

/// One entry of the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSpec {
    pub name: &'static str,
    /// Attributes this type may carry, in render order.
    pub attributes: &'static [&'static str],
    /// Markup with `%attrs%` and `%inner%` slots.
    pub template: &'static str,
    /// Whether `value` defaults to the current field input on re-render.
    pub repopulate: bool,
}

impl TypeSpec {
    pub fn carries(&self, attribute: &str) -> bool {
        self.attributes.contains(&attribute)
    }

    /// Class-bearing types receive the error class when their field is invalid.
    pub fn is_class_bearing(&self) -> bool {
        self.carries("class")
    }

    /// The field's own element, as opposed to its label, error or options.
    /// Only these receive per-field default attributes.
    pub fn names_field(&self) -> bool {
        self.carries("name") || self.carries("id")
    }

    /// Types whose inner content is a generated option list.
    pub fn is_container(&self) -> bool {
        matches!(self.name, "select" | "optgroup" | "datalist")
    }

    /// Types whose inner content is plain text: it goes through the content
    /// transform and is HTML-escaped. Everything else is nested markup.
    pub fn has_text_content(&self) -> bool {
        matches!(self.name, "label" | "option" | "textarea")
    }

    /// Types whose `checked`/`selected` flag is computed from a candidate value.
    pub fn selection_attribute(&self) -> Option<&'static str> {
        if self.carries("checked") {
            Some("checked")
        } else if self.carries("selected") {
            Some("selected")
        } else {
            None
        }
    }
}

const fn input(name: &'static str, attributes: &'static [&'static str], repopulate: bool) -> TypeSpec {
    TypeSpec {
        name,
        attributes,
        template: INPUT_TEMPLATE,
        repopulate,
    }
}

const fn tag(
    name: &'static str,
    attributes: &'static [&'static str],
    template: &'static str,
    repopulate: bool,
) -> TypeSpec {
    TypeSpec {
        name,
        attributes,
        template,
        repopulate,
    }
}

/// Fallback for unknown types: a generic self-closing input.
pub const GENERIC_INPUT: TypeSpec = input("text", TEXT_ATTRS, true);

pub const TAXONOMY: &[TypeSpec] = &[
    input("text", TEXT_ATTRS, true),
    input("email", TEXT_ATTRS, true),
    input("search", TEXT_ATTRS, true),
    input("tel", TEXT_ATTRS, true),
    input("url", TEXT_ATTRS, true),
    input("password", TEXT_ATTRS, false),
    input("number", RANGED_ATTRS, true),
    input("range", RANGED_ATTRS, true),
    input("date", RANGED_ATTRS, true),
    input("datetime-local", RANGED_ATTRS, true),
    input("time", RANGED_ATTRS, true),
    input("month", RANGED_ATTRS, true),
    input("week", RANGED_ATTRS, true),
    input("color", &["name", "id", "type", "value", "class", "disabled", "list"], true),
    input("hidden", &["name", "id", "type", "value"], true),
    input("checkbox", CHECKABLE_ATTRS, false),
    input("radio", CHECKABLE_ATTRS, false),
    input(
        "file",
        &["name", "id", "type", "class", "accept", "multiple", "disabled", "required"],
        false,
    ),
    input("submit", BUTTON_ATTRS, false),
    input("reset", BUTTON_ATTRS, false),
    input("image", &["name", "id", "type", "class", "src", "alt", "width", "height"], false),
    tag("button", BUTTON_ATTRS, "<button%attrs%>%inner%</button>", false),
    tag(
        "textarea",
        &[
            "name", "id", "class", "rows", "cols", "placeholder", "disabled", "readonly",
            "required", "maxlength", "wrap",
        ],
        "<textarea%attrs%>%inner%</textarea>",
        true,
    ),
    tag(
        "select",
        &["name", "id", "class", "multiple", "size", "disabled", "required"],
        "<select%attrs%>%inner%</select>",
        false,
    ),
    tag(
        "option",
        &["value", "label", "selected", "disabled"],
        "<option%attrs%>%inner%</option>",
        false,
    ),
    tag("optgroup", &["label", "disabled"], "<optgroup%attrs%>%inner%</optgroup>", false),
    tag("datalist", &["id"], "<datalist%attrs%>%inner%</datalist>", false),
    tag("label", &["for", "class"], "<label%attrs%>%inner%</label>", false),
    tag("error", &["class", "data-error_for"], "<span%attrs%>%inner%</span>", false),
    tag("fieldset", &["name", "class", "disabled"], "<fieldset%attrs%>%inner%</fieldset>", false),
    tag("legend", &["class"], "<legend%attrs%>%inner%</legend>", false),
    tag(
        "form",
        &["name", "id", "action", "method", "enctype", "accept-charset", "class", "novalidate"],
        "<form%attrs%>",
        false,
    ),
];

/// Look up a type, falling back to [`GENERIC_INPUT`].
pub fn lookup(type_name: &str) -> &'static TypeSpec {
    find(type_name).unwrap_or(&GENERIC_INPUT)
}

pub fn find(type_name: &str) -> Option<&'static TypeSpec> {
    TAXONOMY.iter().find(|spec| spec.name == type_name)
}

/// Fill a template's slots in a single pass. Slot markers that appear inside
/// the substituted text are left as they are.
pub fn fill(template: &str, attrs: &str, inner: &str) -> String {
    let mut out = String::with_capacity(template.len() + attrs.len() + inner.len());
    let mut rest = template;
    loop {
        let next = [(ATTRS_SLOT, attrs), (INNER_SLOT, inner)]
            .into_iter()
            .filter_map(|(slot, value)| rest.find(slot).map(|pos| (pos, slot, value)))
            .min_by_key(|(pos, _, _)| *pos);
        match next {
            Some((pos, slot, value)) => {
                out.push_str(&rest[..pos]);
                out.push_str(value);
                rest = &rest[pos + slot.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}
