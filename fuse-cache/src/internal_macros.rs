macro_rules! getters {
    ($($f:ident: $t:ty,)+) => {$(
        #[must_use]
        #[inline]
        pub const fn $f(&self) -> $t {
            self.$f
        }
    )+};
}

macro_rules! setters {
    ($($f:ident: $t:ty,)+) => {$(
        #[inline]
        pub fn $f(&mut self, $f: $t) -> &mut Self {
            self.$f = $f;
            self
        }
    )+};
}

macro_rules! declare_errno {
    ($($name:ident,)+) => {
        impl Errno {
            $(
                #[allow(missing_docs)]
                pub const $name: Self = Self(libc::$name);
            )+
        }

        #[cfg(test)]
        fn known_errno_name(raw: i32) -> Option<&'static str> {
            match raw {
                $(libc::$name => Some(stringify!($name)),)+
                _ => None,
            }
        }
    };
}
