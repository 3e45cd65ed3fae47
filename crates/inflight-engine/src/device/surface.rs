use super::AcquireOutcome;

pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        for f in preferred {
            if caps.formats.contains(&f) {
                return Some(f);
            }
        }
    }

    Some(caps.formats[0])
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Maps a wgpu acquire failure onto the scheduler's outcome.
///
/// Lost and outdated surfaces both need a refresh; out-of-memory cannot be
/// recovered from.
pub(crate) fn map_surface_error(err: wgpu::SurfaceError) -> AcquireOutcome {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => AcquireOutcome::OutOfDate,
        wgpu::SurfaceError::OutOfMemory => AcquireOutcome::DeviceLost,
        wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => AcquireOutcome::Timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_errors_map_to_acquire_outcomes() {
        assert_eq!(map_surface_error(wgpu::SurfaceError::Lost), AcquireOutcome::OutOfDate);
        assert_eq!(map_surface_error(wgpu::SurfaceError::Outdated), AcquireOutcome::OutOfDate);
        assert_eq!(map_surface_error(wgpu::SurfaceError::OutOfMemory), AcquireOutcome::DeviceLost);
        assert_eq!(map_surface_error(wgpu::SurfaceError::Timeout), AcquireOutcome::Timeout);
        assert_eq!(map_surface_error(wgpu::SurfaceError::Other), AcquireOutcome::Timeout);
    }

    #[test]
    fn srgb_format_preferred_when_requested() {
        let caps = wgpu::SurfaceCapabilities {
            formats: vec![wgpu::TextureFormat::Rgba8Unorm, wgpu::TextureFormat::Rgba8UnormSrgb],
            ..Default::default()
        };
        assert_eq!(choose_surface_format(&caps, true), Some(wgpu::TextureFormat::Rgba8UnormSrgb));
        assert_eq!(choose_surface_format(&caps, false), Some(wgpu::TextureFormat::Rgba8Unorm));
        assert_eq!(choose_surface_format(&wgpu::SurfaceCapabilities::default(), true), None);
    }

    #[test]
    fn unsupported_alpha_mode_falls_back() {
        let caps = wgpu::SurfaceCapabilities {
            alpha_modes: vec![wgpu::CompositeAlphaMode::Opaque],
            ..Default::default()
        };
        assert_eq!(
            choose_alpha_mode(&caps, Some(wgpu::CompositeAlphaMode::PreMultiplied)),
            wgpu::CompositeAlphaMode::Opaque
        );
        let no_modes = wgpu::SurfaceCapabilities {
            alpha_modes: vec![],
            ..Default::default()
        };
        assert_eq!(choose_alpha_mode(&no_modes, None), wgpu::CompositeAlphaMode::Auto);
    }
}
