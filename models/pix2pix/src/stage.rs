/// Number of encoder stages, and of decoder stages.
pub const DEPTH: u8 = 8;

/// A stage of the generator, numbered from 1 as in the checkpoint scopes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Stage {
    Encoder(u8),
    Decoder(u8),
}

/// A parameter of a stage.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Role {
    Kernel,
    Bias,
    Gamma,
    Beta,
}

impl Stage {
    /// Stages in execution order: encoders ascending, then decoders descending.
    pub fn all() -> impl Iterator<Item = Stage> {
        (1..=DEPTH)
            .map(Stage::Encoder)
            .chain((1..=DEPTH).rev().map(Stage::Decoder))
    }

    /// Whether the stage output goes through batch normalization.
    #[inline]
    pub fn is_normalized(self) -> bool {
        !matches!(self, Self::Encoder(1) | Self::Decoder(1))
    }

    /// Parameters the stage reads.
    #[inline]
    pub fn roles(self) -> &'static [Role] {
        if self.is_normalized() {
            &[Role::Kernel, Role::Bias, Role::Gamma, Role::Beta]
        } else {
            &[Role::Kernel, Role::Bias]
        }
    }

    /// Checkpoint name of a parameter, e.g. `generator/encoder_3/conv2d/kernel`.
    pub fn name(self, role: Role) -> String {
        let (scope, conv) = match self {
            Self::Encoder(i) => (format!("generator/encoder_{i}"), "conv2d"),
            Self::Decoder(i) => (format!("generator/decoder_{i}"), "conv2d_transpose"),
        };
        match role {
            Role::Kernel => format!("{scope}/{conv}/kernel"),
            Role::Bias => format!("{scope}/{conv}/bias"),
            Role::Gamma => format!("{scope}/batch_normalization/gamma"),
            Role::Beta => format!("{scope}/batch_normalization/beta"),
        }
    }

    /// Every name a complete set of generator weights holds.
    pub fn required_names() -> impl Iterator<Item = String> {
        Self::all().flat_map(|stage| stage.roles().iter().map(move |&role| stage.name(role)))
    }
}

#[test]
fn test_names() {
    assert_eq!(
        Stage::Encoder(4).name(Role::Kernel),
        "generator/encoder_4/conv2d/kernel"
    );
    assert_eq!(
        Stage::Decoder(2).name(Role::Bias),
        "generator/decoder_2/conv2d_transpose/bias"
    );
    assert_eq!(
        Stage::Decoder(5).name(Role::Gamma),
        "generator/decoder_5/batch_normalization/gamma"
    );
}

#[test]
fn test_required_names() {
    let names = Stage::required_names().collect::<Vec<_>>();
    // two unnormalized stages with 2 parameters, fourteen with 4
    assert_eq!(names.len(), 2 * 2 + 14 * 4);
    assert_eq!(names[0], "generator/encoder_1/conv2d/kernel");
    assert_eq!(names[2], "generator/encoder_2/conv2d/kernel");
    assert_eq!(names.last().unwrap(), "generator/decoder_1/conv2d_transpose/bias");
    assert!(!names.contains(&"generator/encoder_1/batch_normalization/gamma".to_string()));
}
