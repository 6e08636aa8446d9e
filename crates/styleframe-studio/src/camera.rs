/// Moving RGB gradient in 0..255, standing in for a camera.
pub struct SyntheticCamera {
    width: usize,
    height: usize,
    frame: u64,
    data: Vec<f32>,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (width as usize, height as usize);
        Self {
            width,
            height,
            frame: 0,
            data: vec![0.0; width * height * 3],
        }
    }

    /// `[height, width, 3]`.
    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, 3]
    }

    pub fn next_frame(&mut self) -> &[f32] {
        let phase = (self.frame % 256) as f32;
        let (w, h) = (self.width.max(2) - 1, self.height.max(2) - 1);

        for (i, px) in self.data.chunks_exact_mut(3).enumerate() {
            let (x, y) = (i % self.width, i / self.width);
            px[0] = (x * 255 / w) as f32;
            px[1] = (y * 255 / h) as f32;
            px[2] = phase;
        }

        self.frame += 1;
        &self.data
    }
}
