//! String-tagged encoding for the closed polymorphic unions.
//!
//! Every union value goes over the wire as the pair `(tag, body)`. The tag
//! is a short registered string, so a receiver picks the decoder for the
//! body before looking at it, and an unregistered tag is rejected instead of
//! being decoded as something else.

/// Declares a closed enum whose variants each wrap one body type and carry a
/// registered wire tag.
///
/// Generates the enum itself, `TAGS`, `tag()`, `From<Body>` for every variant
/// and the tuple-shaped `Serialize`/`Deserialize` impls.
macro_rules! tagged_union {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident($body:ty) = $tag:literal,
            )+
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant($body),
            )+
        }

        impl $name {
            /// Every registered wire tag, in declaration order.
            pub const TAGS: &'static [&'static str] = &[$($tag),+];

            /// The wire tag of this value.
            pub fn tag(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => $tag,)+
                }
            }
        }

        $(
            impl From<$body> for $name {
                fn from(body: $body) -> Self {
                    Self::$variant(body)
                }
            }
        )+

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                use serde::ser::SerializeTuple;

                let mut pair = serializer.serialize_tuple(2)?;
                match self {
                    $(
                        Self::$variant(body) => {
                            pair.serialize_element($tag)?;
                            pair.serialize_element(body)?;
                        }
                    )+
                }
                pair.end()
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                struct PairVisitor;

                impl<'de> serde::de::Visitor<'de> for PairVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                        f.write_str(concat!("a tagged ", stringify!($name)))
                    }

                    fn visit_seq<A>(self, mut seq: A) -> Result<$name, A::Error>
                    where
                        A: serde::de::SeqAccess<'de>,
                    {
                        let tag: String = seq
                            .next_element()?
                            .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                        match tag.as_str() {
                            $(
                                $tag => {
                                    let body: $body = seq
                                        .next_element()?
                                        .ok_or_else(|| serde::de::Error::invalid_length(1, &self))?;
                                    Ok($name::$variant(body))
                                }
                            )+
                            other => Err(serde::de::Error::unknown_variant(other, $name::TAGS)),
                        }
                    }
                }

                deserializer.deserialize_tuple(2, PairVisitor)
            }
        }
    };
}

pub(crate) use tagged_union;
