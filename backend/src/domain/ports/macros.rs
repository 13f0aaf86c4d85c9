//! `define_port_error!`: adapter error enums with snake_case constructors.
//!
//! Each variant gets a `thiserror` message and a constructor named after it
//! whose parameters take `impl Into<FieldType>`, so adapters can pass `&str`
//! or a formatted `String` alike.

macro_rules! define_port_error {
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        ::paste::paste! {
            impl $name {
                $(
                    #[doc = "Build [`" $name "::" $variant "`]."]
                    pub fn [<$variant:snake>]($($($field: impl Into<$ty>),*)?) -> Self {
                        Self::$variant $( { $($field: $field.into()),* } )?
                    }
                )*
            }
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    define_port_error! {
        pub enum RelayError {
            Rejected { message: String } => "relay rejected notice: {message}",
            Throttled { retry_after_secs: u32 } => "relay throttled for {retry_after_secs}s",
            Bounced { address: String, attempts: u32 } => "{address} bounced after {attempts} attempts",
            Offline => "relay offline",
        }
    }

    #[test]
    fn string_fields_accept_str() {
        let err = RelayError::rejected("mailbox full");
        assert_eq!(err.to_string(), "relay rejected notice: mailbox full");
    }

    #[test]
    fn mixed_fields_and_unit_variants() {
        let err = RelayError::bounced("bob@example.com", 3_u32);
        assert_eq!(err.to_string(), "bob@example.com bounced after 3 attempts");
        assert_eq!(RelayError::throttled(30_u32).to_string(), "relay throttled for 30s");
        assert_eq!(RelayError::offline(), RelayError::Offline);
    }
}
