/// Builds a static table of sniffing `Signature`s. Entries are tried in the
/// order they are written, so more specific patterns have to come first.
///
/// - `html(pattern)`: case-insensitive tag after leading whitespace, followed by ` ` or `>`.
/// - `exact(pattern)`: literal prefix.
/// - `masked(mask, pattern)`: prefix compared after `AND`-ing the data with `mask`.
/// - `masked_ws(mask, pattern)`: as `masked`, after skipping leading whitespace.
/// - `mp4()`: ISO base media `ftyp` box with an `mp4` brand.
/// - `text()`: no binary control bytes.
macro_rules! define_signatures {
    (@matcher html($pat:literal)) => { Matcher::Html($pat) };
    (@matcher exact($pat:literal)) => { Matcher::Exact($pat) };
    (@matcher masked($mask:literal, $pat:literal)) => {
        Matcher::Masked { mask: $mask, pat: $pat, skip_ws: false }
    };
    (@matcher masked_ws($mask:literal, $pat:literal)) => {
        Matcher::Masked { mask: $mask, pat: $pat, skip_ws: true }
    };
    (@matcher mp4()) => { Matcher::Mp4 };
    (@matcher text()) => { Matcher::Text };
    {$vis:vis static $name:ident = [$($kind:ident $args:tt => $content_type:literal),* $(,)?];} => {
        $vis static $name: &[Signature] = &[
            $(Signature {
                matcher: define_signatures!(@matcher $kind $args),
                content_type: $content_type,
            },)*
        ];
    };
}

pub(super) use define_signatures;
